//! Staging area for downloaded uploads.
//!
//! Every staging gets its own directory `<root>/<uuid>/` so concurrent
//! messages never share a path. The returned [`StagingHandle`] owns that
//! directory; callers release it explicitly, and dropping an unreleased
//! handle removes the directory as a last resort.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StagingError;
use crate::storage::{StorageClient, locator_file_name};

/// Fallback file name when neither storage nor the locator provide one.
const DEFAULT_FILE_NAME: &str = "upload.zip";

/// Root directory under which per-message staging directories are created.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Download `locator` from `container_name` into a fresh directory.
    ///
    /// Fails with [`StagingError::FileNotFound`] when storage has no such
    /// file or the file is empty. The directory is removed on every failure.
    pub async fn stage(
        &self,
        storage: &dyn StorageClient,
        container_name: &str,
        locator: &str,
    ) -> Result<StagingHandle, StagingError> {
        let id = Uuid::new_v4();
        let dir = std::path::absolute(self.root.join(id.to_string()))
            .map_err(|e| StagingError::io(&self.root, e))?;

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StagingError::io(&dir, e))?;
        debug!(staging_id = %id, dir = %dir.display(), "Created staging directory");

        match download(storage, container_name, locator, &dir).await {
            Ok(file) => Ok(StagingHandle {
                id,
                dir,
                file,
                released: false,
            }),
            Err(e) => {
                if let Err(cleanup) = release(&dir).await {
                    warn!(dir = %dir.display(), error = %cleanup, "Failed to remove staging directory");
                }
                Err(e)
            }
        }
    }
}

/// Fetch the file and write it below `dir`, returning the file path.
async fn download(
    storage: &dyn StorageClient,
    container_name: &str,
    locator: &str,
    dir: &Path,
) -> Result<PathBuf, StagingError> {
    let entity = storage
        .get_file_from_url(container_name, locator)
        .await?
        .ok_or_else(|| StagingError::FileNotFound(locator.to_string()))?;

    let file_name = base_name(&entity.name)
        .or_else(|| base_name(locator_file_name(locator)))
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();
    let path = dir.join(file_name);

    let mut file = fs::File::create(&path)
        .await
        .map_err(|e| StagingError::io(&path, e))?;
    let mut stream = entity.byte_stream();
    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| StagingError::io(&path, e))?;
        written += chunk.len();
    }
    file.flush().await.map_err(|e| StagingError::io(&path, e))?;

    if written == 0 {
        return Err(StagingError::FileNotFound(locator.to_string()));
    }

    debug!(path = %path.display(), bytes = written, "Staged file");
    Ok(path)
}

/// Last path component of `name`, if it is a usable file name.
fn base_name(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
}

/// A staged file and the directory that owns it.
#[derive(Debug)]
pub struct StagingHandle {
    id: Uuid,
    dir: PathBuf,
    file: PathBuf,
    released: bool,
}

impl StagingHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Absolute path of the staged file.
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove the staging directory and everything in it.
    pub async fn release(mut self) -> Result<(), StagingError> {
        self.released = true;
        release(&self.dir).await
    }
}

impl Drop for StagingHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed unreleased staging directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "Failed to remove staging directory"),
        }
    }
}

/// Remove `path`: a file is deleted, a directory is deleted recursively.
///
/// A missing target is not an error.
pub async fn release(path: &Path) -> Result<(), StagingError> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StagingError::io(path, e)),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Released staging path");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StagingError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::storage::LocalStorageClient;

    const LOCATOR: &str = "https://store.example.com/osw/uploads/valid.zip";

    fn storage_with(name: &str, content: &[u8]) -> (TempDir, LocalStorageClient) {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("osw").join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
        let client = LocalStorageClient::new(root.path());
        (root, client)
    }

    #[tokio::test]
    async fn stages_into_unique_directory() {
        let (_store, storage) = storage_with("valid.zip", b"PK\x03\x04");
        let downloads = TempDir::new().unwrap();
        let area = StagingArea::new(downloads.path());

        let handle = area.stage(&storage, "osw", LOCATOR).await.unwrap();
        assert!(handle.path().is_absolute());
        assert_eq!(handle.path().file_name().unwrap(), "valid.zip");
        assert_eq!(handle.path().parent().unwrap(), handle.dir());
        assert_eq!(std::fs::read(handle.path()).unwrap(), b"PK\x03\x04");

        let dir = handle.dir().to_path_buf();
        handle.release().await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn missing_file_is_not_found_and_leaves_nothing() {
        let (_store, storage) = storage_with("other.zip", b"PK");
        let downloads = TempDir::new().unwrap();
        let area = StagingArea::new(downloads.path());

        let err = area.stage(&storage, "osw", LOCATOR).await.unwrap_err();
        assert!(matches!(err, StagingError::FileNotFound(ref l) if l == LOCATOR));
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_file_is_not_found() {
        let (_store, storage) = storage_with("valid.zip", b"");
        let downloads = TempDir::new().unwrap();
        let area = StagingArea::new(downloads.path());

        let err = area.stage(&storage, "osw", LOCATOR).await.unwrap_err();
        assert!(matches!(err, StagingError::FileNotFound(_)));
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn concurrent_stagings_never_collide() {
        let (_store, storage) = storage_with("valid.zip", b"PK");
        let storage = Arc::new(storage);
        let downloads = TempDir::new().unwrap();
        let area = Arc::new(StagingArea::new(downloads.path()));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let area = Arc::clone(&area);
            let storage = Arc::clone(&storage);
            tasks.push(tokio::spawn(async move {
                area.stage(storage.as_ref(), "osw", LOCATOR).await.unwrap()
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        let dirs: HashSet<_> = handles.iter().map(|h| h.dir().to_path_buf()).collect();
        assert_eq!(dirs.len(), 32);

        for handle in handles {
            handle.release().await.unwrap();
        }
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn dropped_handle_cleans_up() {
        let (_store, storage) = storage_with("valid.zip", b"PK");
        let downloads = TempDir::new().unwrap();
        let area = StagingArea::new(downloads.path());

        let handle = area.stage(&storage, "osw", LOCATOR).await.unwrap();
        let dir = handle.dir().to_path_buf();
        drop(handle);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.zip");
        std::fs::write(&file, b"x").unwrap();

        release(&file).await.unwrap();
        assert!(!file.exists());
        release(&file).await.unwrap();

        let dir = tmp.path().join("nested");
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("inner").join("b"), b"y").unwrap();
        release(&dir).await.unwrap();
        assert!(!dir.exists());
        release(&dir).await.unwrap();
    }
}
