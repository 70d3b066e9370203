mod gcs;
mod local;

pub use gcs::GcsArtifactStore;
pub use local::LocalArtifactStore;

use crate::{Result, config::StorageConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// One object to upload: raw bytes and the blob name they are stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub blob_name: String,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, blob_name: impl Into<String>) -> Self {
        Self {
            bytes,
            blob_name: blob_name.into(),
        }
    }
}

/// Durable object storage for generated images.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Uploads every artifact and returns one URL per input, in input order.
    async fn upload(&self, batch: Vec<Artifact>) -> Result<Vec<String>>;
}

pub fn create_artifact_store(config: &StorageConfig) -> Result<Arc<dyn ArtifactStore>> {
    match config {
        StorageConfig::Gcs(gcs) => Ok(Arc::new(GcsArtifactStore::new(gcs.clone())?)),
        StorageConfig::Local(local) => Ok(Arc::new(LocalArtifactStore::new(local.root.clone()))),
    }
}

/// MIME type for a blob name, by extension.
pub fn content_type_for(blob_name: &str) -> &'static str {
    let ext = blob_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
