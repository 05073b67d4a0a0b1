//! Directory-backed storage.
//!
//! Each container is a subdirectory of the root. A locator such as
//! `https://host/osw/uploads/a.zip` resolves to `<root>/osw/uploads/a.zip`:
//! everything after the container segment is the path inside the container.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::StorageError;
use crate::storage::{ContainerHandle, FileEntity, StorageClient, locator_path};

pub struct LocalStorageClient {
    root: PathBuf,
}

impl LocalStorageClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a locator to a path inside the container directory.
    fn resolve(&self, container_name: &str, url: &str) -> Result<PathBuf, StorageError> {
        let segments: Vec<&str> = locator_path(url)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if segments.iter().any(|s| *s == ".." || *s == ".") {
            return Err(StorageError::InvalidLocator(url.to_string()));
        }

        let inside = match segments.iter().position(|s| *s == container_name) {
            Some(idx) => &segments[idx + 1..],
            None => &segments[..],
        };
        if inside.is_empty() {
            return Err(StorageError::InvalidLocator(url.to_string()));
        }

        let mut path = self.root.join(container_name);
        for segment in inside {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn get_container(&self, container_name: &str) -> Result<ContainerHandle, StorageError> {
        let dir = self.root.join(container_name);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(ContainerHandle {
                name: container_name.to_string(),
            }),
            Ok(_) => Err(StorageError::ContainerNotFound(container_name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ContainerNotFound(container_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file_from_url(
        &self,
        container_name: &str,
        url: &str,
    ) -> Result<Option<FileEntity>, StorageError> {
        let path = self.resolve(container_name, url)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_path = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();

        let stream = futures::stream::once(async move {
            fs::read(&path).await.map_err(StorageError::from)
        });
        Ok(Some(FileEntity::new(name, file_path, Box::pin(stream))))
    }
}
