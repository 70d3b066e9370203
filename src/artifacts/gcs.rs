use super::{Artifact, ArtifactStore, content_type_for};
use crate::{Error, Result, config::GcsConfig};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::{debug, info};

/// Google Cloud Storage uploader using the JSON API media upload.
pub struct GcsArtifactStore {
    client: Client,
    config: GcsConfig,
    public_base: Url,
}

impl GcsArtifactStore {
    pub fn new(config: GcsConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::config("storage.bucket must not be empty"));
        }

        let public_base = Url::parse(&config.public_base_url).map_err(|e| {
            Error::config(format!(
                "storage.public_base_url '{}' is invalid: {e}",
                config.public_base_url
            ))
        })?;
        if public_base.cannot_be_a_base() {
            return Err(Error::config(format!(
                "storage.public_base_url '{}' cannot hold a path",
                config.public_base_url
            )));
        }

        Ok(Self {
            client: Client::new(),
            config,
            public_base,
        })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket
        )
    }

    /// Public address of an uploaded blob. Each path segment is percent-encoded.
    pub fn public_url(&self, blob_name: &str) -> String {
        let mut url = self.public_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.config.bucket)
                .extend(blob_name.split('/'));
        }
        url.to_string()
    }

    async fn upload_one(&self, artifact: Artifact) -> Result<String> {
        let content_type = content_type_for(&artifact.blob_name);

        let mut request = self
            .client
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", artifact.blob_name.as_str())])
            .header(CONTENT_TYPE, content_type);

        if let Some(ref token) = self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.body(artifact.bytes).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upload(format!(
                "{} rejected with {}: {}",
                artifact.blob_name, status, body
            )));
        }

        debug!("Uploaded {} ({})", artifact.blob_name, content_type);
        Ok(self.public_url(&artifact.blob_name))
    }
}

#[async_trait]
impl ArtifactStore for GcsArtifactStore {
    async fn upload(&self, batch: Vec<Artifact>) -> Result<Vec<String>> {
        let total = batch.len();
        let mut urls = Vec::with_capacity(total);

        // Sequential so the URL list lines up with the input.
        for artifact in batch {
            urls.push(self.upload_one(artifact).await?);
        }

        info!(
            "Uploaded {} objects to bucket {}",
            total, self.config.bucket
        );
        Ok(urls)
    }
}
