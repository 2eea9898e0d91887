//! Download transport
//!
//! Rules never talk to the network directly; they go through a
//! [`Downloader`]. Retries and backoff belong to the transport, not to the
//! rule executor.

use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Upper bound on a single downloaded payload
const MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// Fetches the bytes behind a URL
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP(S) downloader backed by `ureq`; also reads `file://` URLs
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    timeout: Duration,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!("Reading {}", path);
            return tokio::fs::read(path)
                .await
                .map_err(|e| FetchError::network(url, e.to_string()));
        }

        debug!("Downloading {}", url);
        let timeout = self.timeout;
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into();
            let mut response = agent
                .get(&owned)
                .call()
                .map_err(|e| FetchError::network(&owned, e.to_string()))?;
            response
                .body_mut()
                .with_config()
                .limit(MAX_DOWNLOAD_BYTES)
                .read_to_vec()
                .map_err(|e| FetchError::network(&owned, e.to_string()))
        })
        .await
        .map_err(|e| FetchError::rule(format!("download task failed: {}", e)))?
    }
}

/// Downloader that refuses every request
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineDownloader;

#[async_trait]
impl Downloader for OfflineDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::network(url, "network access is disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_file_urls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.txt");
        std::fs::write(&path, "payload").unwrap();

        let url = format!("file://{}", path.display());
        let bytes = HttpDownloader::default().download(&url).await.unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[tokio::test]
    async fn missing_file_is_network_error() {
        let err = HttpDownloader::default()
            .download("file:///definitely/not/here")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn offline_refuses() {
        let err = OfflineDownloader.download("https://example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }
}
