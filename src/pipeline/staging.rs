use super::{AssetRef, ImageAsset};
use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Token-scoped local directories shared with the external jobs.
#[derive(Debug, Clone)]
pub struct Staging {
    users_dir: PathBuf,
    results_dir: PathBuf,
}

impl Staging {
    pub fn new(users_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            users_dir: users_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    pub fn user_dir(&self, token: &str) -> Result<PathBuf> {
        Ok(self.users_dir.join(path_component("token", token)?))
    }

    pub fn result_dir(&self, token: &str) -> Result<PathBuf> {
        Ok(self.results_dir.join(path_component("token", token)?))
    }

    /// Decodes `base64_content` and writes it to `{users_dir}/{token}/{filename}`.
    ///
    /// Content is decoded before anything touches the disk, so malformed input
    /// leaves no file or directory behind.
    pub async fn save_asset(
        &self,
        token: &str,
        filename: &str,
        base64_content: &str,
    ) -> Result<AssetRef> {
        let dir = self.user_dir(token)?;
        let filename = path_component("filename", filename)?;

        let compact: String = base64_content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = general_purpose::STANDARD.decode(compact)?;

        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;

        info!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(AssetRef {
            token: token.to_string(),
            path,
        })
    }

    /// Paths of reference images already saved for `token`.
    pub async fn reference_images(&self, token: &str) -> Result<Vec<String>> {
        let dir = self.user_dir(token)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        Ok(image_files(&dir)
            .await?
            .into_iter()
            .map(|(_, path)| path.to_string_lossy().into_owned())
            .collect())
    }

    /// Reads every generated image for `token`, sorted by filename.
    pub async fn collect_results(&self, token: &str) -> Result<Vec<ImageAsset>> {
        let dir = self.result_dir(token)?;

        let mut assets = Vec::new();
        for (filename, path) in image_files(&dir).await? {
            let bytes = tokio::fs::read(&path).await?;
            assets.push(ImageAsset {
                token: token.to_string(),
                filename,
                bytes,
            });
        }

        debug!("Collected {} images from {}", assets.len(), dir.display());
        Ok(assets)
    }

    pub async fn remove_results(&self, token: &str) {
        let dir = match self.result_dir(token) {
            Ok(dir) => dir,
            Err(_) => return,
        };

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
        }
    }
}

async fn image_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_image(&name) {
            files.push((name, entry.path()));
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn is_image(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Accepts `value` only if it is a single, plain path component.
fn path_component<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(value),
        _ => Err(Error::invalid_input(format!("invalid {what}: {value:?}"))),
    }
}
