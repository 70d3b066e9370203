mod client;

pub use client::OpenAiSummarizer;

use crate::Result;
use async_trait::async_trait;

/// Album metadata handed to the summarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub lyric: String,
    pub album_name: String,
    pub song_names: Vec<String>,
    pub gender: String,
    pub genre: String,
    pub artist_name: String,
}

/// Turns album metadata into a short scene description for the image prompt.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> Result<String>;
}
