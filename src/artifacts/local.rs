use super::{Artifact, ArtifactStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores artifacts under a local directory. Used for development setups
/// without cloud credentials.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, blob_name: &str) -> Result<PathBuf> {
        let relative = Path::new(blob_name);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || blob_name.is_empty() {
            return Err(Error::upload(format!("invalid blob name: {blob_name}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, batch: Vec<Artifact>) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(batch.len());

        for artifact in batch {
            let path = self.object_path(&artifact.blob_name)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &artifact.bytes).await?;

            let absolute = tokio::fs::canonicalize(&path).await?;
            debug!("Stored {} at {}", artifact.blob_name, absolute.display());
            urls.push(format!("file://{}", absolute.display()));
        }

        Ok(urls)
    }
}
