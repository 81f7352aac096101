//! Blob storage for media, reports and assignment sheets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob name: {0}")]
    InvalidName(String),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob fetch failed: {0}")]
    Fetch(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `folder/name` and return its public URL.
    async fn put(
        &self,
        folder: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError>;

    /// Read back a blob by URL. URLs outside this store are downloaded.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError>;
}

/// Blobs kept in a local directory and served under `public_base`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
    http: Client,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base: &Url) -> Self {
        Self {
            root,
            public_base: public_base.as_str().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(&self, relative: &str) -> Result<PathBuf, BlobError> {
        let mut path = self.root.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            path.push(checked_segment(segment)?);
        }
        Ok(path)
    }
}

/// Reject path segments that could escape the blob root.
fn checked_segment(segment: &str) -> Result<&str, BlobError> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(segment)
    } else {
        Err(BlobError::InvalidName(segment.to_string()))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        folder: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        checked_segment(name)?;
        let relative = format!("{}/{}", folder.trim_matches('/'), name);
        let path = self.local_path(&relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(
            "Stored {} ({} bytes, {}) at {}",
            relative,
            bytes.len(),
            content_type,
            path.display()
        );
        Ok(format!("{}/{}", self.public_base, relative))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        if let Some(relative) = url
            .strip_prefix(&self.public_base)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            let path = self.local_path(relative)?;
            return Ok(tokio::fs::read(&path).await?);
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BlobError::Fetch(format!("{}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BlobError::Fetch(format!("{} returned {}", url, status)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BlobError::Fetch(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}
