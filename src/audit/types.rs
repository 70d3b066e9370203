use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStream {
    Input,
    Output,
}

impl AuditStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for AuditStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Echo of an accepted generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    pub input_id: String,
    pub user_id: String,
    pub token: String,
    pub model: String,
    pub song_names: Vec<String>,
    pub artist_name: String,
    pub album_name: String,
    pub genre: String,
    pub lyric: String,
    pub gender: String,
    pub image_urls: Vec<String>,
    pub create_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub output_id: String,
    pub input_id: String,
    pub image_urls: Vec<String>,
    pub seeds: Vec<u32>,
    pub prompt: String,
    pub create_date: String,
}

/// One stored audit entry as read back from the logger.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub stream: AuditStream,
    pub payload: serde_json::Value,
}

/// Renders `now` in a fixed civil offset, e.g. `2026-10-19T18:30:00.123+09:00`.
pub fn civil_timestamp(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).to_rfc3339()
}
