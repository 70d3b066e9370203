use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: String,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumInfo {
    #[serde(default)]
    pub lyric: String,
    pub album_name: String,
    #[serde(default)]
    pub song_names: Vec<String>,
    pub genre: String,
    pub artist_name: String,
}

/// One accepted train-and-render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub user: UserProfile,
    pub album: AlbumInfo,
    pub token: String,
}

/// An image owned by a token: a user reference picture or a rendered cover.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub token: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn blob_name(&self) -> String {
        format!("{}/{}", self.token, self.filename)
    }
}

/// Where a saved asset landed on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub token: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validate,
    Save,
    Acquire,
    Train,
    Postprocess,
    Prompt,
    Infer,
    Collect,
    Upload,
    Log,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Save => "save",
            Self::Acquire => "acquire",
            Self::Train => "train",
            Self::Postprocess => "postprocess",
            Self::Prompt => "prompt",
            Self::Infer => "infer",
            Self::Collect => "collect",
            Self::Upload => "upload",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub images: Vec<String>,
    pub output_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    /// Always `"error"`.
    pub status: String,
    pub message: String,
    pub stage: PipelineStage,
}

impl PipelineFailure {
    pub fn new(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            stage,
        }
    }
}

/// What a pipeline run hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineOutcome {
    Completed(PipelineResult),
    Failed(PipelineFailure),
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
