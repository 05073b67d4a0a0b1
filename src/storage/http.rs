//! HTTP(S) storage backend.
//!
//! Locators are absolute URLs (pre-signed where the store requires it), so
//! the container name is only used for the nominal container handle.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::StorageError;
use crate::storage::{ContainerHandle, FileEntity, StorageClient, locator_file_name, locator_path};

/// Connect timeout for storage requests. The body itself is streamed without a deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Storage client that downloads locators with `reqwest`.
pub struct HttpStorageClient {
    client: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new() -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StorageError::RequestFailed {
                url: String::new(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn get_container(&self, container_name: &str) -> Result<ContainerHandle, StorageError> {
        Ok(ContainerHandle {
            name: container_name.to_string(),
        })
    }

    async fn get_file_from_url(
        &self,
        _container_name: &str,
        url: &str,
    ) -> Result<Option<FileEntity>, StorageError> {
        if !is_http_url(url) {
            return Err(StorageError::InvalidLocator(url.to_string()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "Storage returned 404");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StorageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let source = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| StorageError::RequestFailed {
                    url: source.clone(),
                    reason: e.to_string(),
                })
        });

        Ok(Some(FileEntity::new(
            locator_file_name(url),
            locator_path(url).trim_start_matches('/'),
            Box::pin(stream),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_http_urls() {
        assert!(is_http_url("https://example.com/a.zip"));
        assert!(is_http_url("HTTP://example.com/a.zip"));
        assert!(!is_http_url("file:///tmp/a.zip"));
        assert!(!is_http_url("osw/a.zip"));
    }

    #[tokio::test]
    async fn rejects_non_http_locator_without_network() {
        let client = HttpStorageClient::new().unwrap();
        let err = client.get_file_from_url("osw", "ftp://x/a.zip").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidLocator(_)));
    }

    #[tokio::test]
    async fn container_handle_is_nominal() {
        let client = HttpStorageClient::new().unwrap();
        let handle = client.get_container("osw").await.unwrap();
        assert_eq!(handle.name, "osw");
    }
}
