//! Filesystem blob storage keyed by `(bucket, filename)`.
//!
//! Layout is one flat directory per bucket beneath the storage root:
//! `{root}/{bucket_id}/{digest}{extension}`. Incoming bytes are written to a
//! scratch file under `{root}/.scratch` first and only renamed into place
//! once complete, so a reader never observes a truncated blob.

use crate::errors::{ServiceError, ServiceResult};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs::{self, File};
use tracing::{debug, warn};
use uuid::Uuid;

const SCRATCH_DIR: &str = ".scratch";
const MAX_FILENAME_LEN: usize = 255;

#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
}

/// A scratch file that is removed when dropped unless it was moved away.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("discarded scratch file {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove scratch file"
            ),
        }
    }
}

impl ContentStore {
    /// Create the store, making sure the root and scratch directories exist.
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(SCRATCH_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: Uuid) -> PathBuf {
        self.root.join(bucket.to_string())
    }

    /// Resolve the final path of a blob, rejecting names that could escape
    /// the bucket directory.
    pub fn blob_path(&self, bucket: Uuid, filename: &str) -> ServiceResult<PathBuf> {
        ensure_filename_safe(filename)?;
        Ok(self.bucket_dir(bucket).join(filename))
    }

    /// Create an empty scratch file for an incoming upload.
    pub async fn scratch(&self) -> ServiceResult<(ScratchFile, File)> {
        let scratch_dir = self.root.join(SCRATCH_DIR);
        fs::create_dir_all(&scratch_dir).await?;
        let path = scratch_dir.join(format!("upload-{}", Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok((ScratchFile { path }, file))
    }

    /// Move a fully written source file to `{bucket}/{filename}`.
    ///
    /// Falls back to copy-then-delete when a rename is impossible (for
    /// example across filesystems). The copy goes to a hidden temp file in
    /// the bucket directory and is renamed from there, so the final path
    /// only ever holds complete content. An existing blob is replaced; two
    /// writers racing on one name carry identical bytes.
    pub async fn write(&self, bucket: Uuid, filename: &str, source: &Path) -> ServiceResult<()> {
        let final_path = self.blob_path(bucket, filename)?;
        let bucket_dir = self.bucket_dir(bucket);
        fs::create_dir_all(&bucket_dir).await?;

        match fs::rename(source, &final_path).await {
            Ok(()) => {
                debug!("placed blob {}", final_path.display());
                Ok(())
            }
            Err(err) => {
                debug!(
                    error = %err,
                    "rename into {} failed, copying instead",
                    final_path.display()
                );
                let tmp_path = bucket_dir.join(format!(".tmp-{}", Uuid::new_v4()));
                if let Err(err) = copy_and_sync(source, &tmp_path).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ServiceError::Storage(err));
                }
                if let Err(err) = fs::rename(&tmp_path, &final_path).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ServiceError::Storage(err));
                }
                if let Err(err) = fs::remove_file(source).await {
                    if err.kind() != ErrorKind::NotFound {
                        warn!(path = %source.display(), error = %err, "failed to remove copied source");
                    }
                }
                Ok(())
            }
        }
    }

    /// Open a stored blob for reading.
    pub async fn open(&self, bucket: Uuid, filename: &str) -> ServiceResult<File> {
        let path = self.blob_path(bucket, filename)?;
        File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ServiceError::not_found("resource content")
            } else {
                ServiceError::Storage(err)
            }
        })
    }

    /// Remove a blob. Removing a file that does not exist is not an error.
    pub async fn remove(&self, bucket: Uuid, filename: &str) -> ServiceResult<()> {
        let path = self.blob_path(bucket, filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed blob {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
                Ok(())
            }
            Err(err) => Err(ServiceError::Storage(err)),
        }
    }
}

async fn copy_and_sync(source: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(source, dest).await?;
    let file = fs::OpenOptions::new().write(true).open(dest).await?;
    file.sync_all().await
}

/// Reject empty names, separators, parent references and control bytes.
fn ensure_filename_safe(filename: &str) -> ServiceResult<()> {
    if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
        return Err(ServiceError::validation("invalid blob filename length"));
    }
    if filename.starts_with('.') || filename.contains("..") {
        return Err(ServiceError::validation("blob filename must not start with a dot"));
    }
    if filename
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
    {
        return Err(ServiceError::validation("blob filename contains invalid characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn scratch_with(store: &ContentStore, bytes: &[u8]) -> ScratchFile {
        let (scratch, mut file) = store.scratch().await.unwrap();
        file.write_all(bytes).await.unwrap();
        file.sync_all().await.unwrap();
        scratch
    }

    #[tokio::test]
    async fn write_then_open_returns_content() {
        let dir = tempdir().unwrap();
        let store = ContentStore::new(dir.path()).await.unwrap();
        let bucket = Uuid::new_v4();

        let scratch = scratch_with(&store, b"hello").await;
        store.write(bucket, "abc.txt", scratch.path()).await.unwrap();

        let mut file = store.open(bucket, "abc.txt").await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        // Scratch was moved, so dropping the guard finds nothing to remove.
        assert!(!scratch.path().exists());
    }

    #[tokio::test]
    async fn dropped_scratch_file_is_removed() {
        let dir = tempdir().unwrap();
        let store = ContentStore::new(dir.path()).await.unwrap();

        let scratch = scratch_with(&store, b"discard me").await;
        let path = scratch.path().to_path_buf();
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn second_write_replaces_existing_blob() {
        let dir = tempdir().unwrap();
        let store = ContentStore::new(dir.path()).await.unwrap();
        let bucket = Uuid::new_v4();

        let first = scratch_with(&store, b"same").await;
        store.write(bucket, "h.bin", first.path()).await.unwrap();
        let second = scratch_with(&store, b"same").await;
        store.write(bucket, "h.bin", second.path()).await.unwrap();

        let entries = std::fs::read_dir(dir.path().join(bucket.to_string()))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ContentStore::new(dir.path()).await.unwrap();
        let bucket = Uuid::new_v4();

        let scratch = scratch_with(&store, b"x").await;
        store.write(bucket, "x.bin", scratch.path()).await.unwrap();
        store.remove(bucket, "x.bin").await.unwrap();
        store.remove(bucket, "x.bin").await.unwrap();
        assert!(matches!(
            store.open(bucket, "x.bin").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = tempdir().unwrap();
        let store = ContentStore::new(dir.path()).await.unwrap();
        let bucket = Uuid::new_v4();

        for name in ["../escape", "a/b", "", ".hidden", "a\\b"] {
            assert!(
                matches!(store.open(bucket, name).await, Err(ServiceError::Validation(_))),
                "{name} should be rejected"
            );
        }
    }
}
