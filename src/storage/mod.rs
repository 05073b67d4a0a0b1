//! Object storage abstraction.
//!
//! The pipeline only needs to turn a locator into bytes. Backends:
//! - `http`: fetch the locator directly over HTTP(S)
//! - `local`: serve container contents from a directory tree

pub mod http;
pub mod local;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::StorageError;

pub use http::HttpStorageClient;
pub use local::LocalStorageClient;

/// Chunked file content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, StorageError>> + Send>>;

/// A resolved container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub name: String,
}

/// A remote file ready to be read.
pub struct FileEntity {
    /// Base name of the file.
    pub name: String,
    /// Path of the file inside its container.
    pub file_path: String,
    stream: ByteStream,
}

impl FileEntity {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>, stream: ByteStream) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            stream,
        }
    }

    /// A file whose content is already in memory.
    pub fn from_bytes(
        name: impl Into<String>,
        file_path: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        let stream = futures::stream::once(async move { Ok::<_, StorageError>(content) });
        Self::new(name, file_path, Box::pin(stream))
    }

    /// Consume the entity, yielding its content.
    pub fn byte_stream(self) -> ByteStream {
        self.stream
    }
}

impl std::fmt::Debug for FileEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntity")
            .field("name", &self.name)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

/// Storage backend shared by all worker tasks.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Look up a container by name.
    async fn get_container(&self, container_name: &str) -> Result<ContainerHandle, StorageError>;

    /// Resolve a full locator. `Ok(None)` means the file does not exist.
    async fn get_file_from_url(
        &self,
        container_name: &str,
        url: &str,
    ) -> Result<Option<FileEntity>, StorageError>;
}

/// Path component of a locator, without scheme, host, query or fragment.
///
/// Locators without a scheme are treated as bare paths.
pub fn locator_path(locator: &str) -> &str {
    let without_query = locator.split(['?', '#']).next().unwrap_or(locator);
    match without_query.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => without_query,
    }
}

/// Final path segment of a locator.
pub fn locator_file_name(locator: &str) -> &str {
    locator_path(locator).rsplit('/').next().unwrap_or("")
}
