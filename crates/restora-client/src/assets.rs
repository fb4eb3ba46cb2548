//! Asset host: resolves service-relative URLs and saves artifacts to disk.

use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name for a packaged set of restored faces.
pub const FACES_ARCHIVE_NAME: &str = "restored_faces.zip";
/// File name for the packaged merged image.
pub const MERGED_ARCHIVE_NAME: &str = "full_restored_image.zip";

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("invalid asset url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serves face crops, merged images and archives by URL.
#[derive(Clone, Debug)]
pub struct AssetHost {
    client: Client,
    base: Url,
}

impl AssetHost {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Turn a service-relative path (`/static/results/x.png`) into an absolute
    /// URL under the service origin. Absolute URLs pass through unchanged.
    pub fn resolve(&self, url: &str) -> Result<Url, AssetError> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }
        let base = self.base.as_str().trim_end_matches('/');
        let path = url.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| AssetError::InvalidUrl(format!("{url}: {e}")))
    }

    /// Download an asset into memory.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let url = self.resolve(url)?;
        tracing::debug!(%url, "fetching asset");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download an asset to `dir/file_name`, creating `dir` if needed.
    pub async fn save(&self, url: &str, dir: &Path, file_name: &str) -> Result<PathBuf, AssetError> {
        let bytes = self.fetch(url).await?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| AssetError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| AssetError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "artifact saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(base: &str) -> AssetHost {
        AssetHost::new(Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn test_resolve_service_relative() {
        let host = host("http://localhost:5000");
        assert_eq!(
            host.resolve("/static/results/face_0.png").unwrap().as_str(),
            "http://localhost:5000/static/results/face_0.png"
        );
    }

    #[test]
    fn test_resolve_keeps_base_prefix() {
        let host = host("http://example.org/restora/");
        assert_eq!(
            host.resolve("/static/zips/faces.zip").unwrap().as_str(),
            "http://example.org/restora/static/zips/faces.zip"
        );
    }

    #[test]
    fn test_resolve_absolute_passthrough() {
        let host = host("http://localhost:5000");
        let url = "https://cdn.example.org/merged.png";
        assert_eq!(host.resolve(url).unwrap().as_str(), url);
    }
}
