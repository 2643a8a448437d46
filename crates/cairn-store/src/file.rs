//! File-based blob storage backend.
//!
//! Stores one file per blob with a 2-level fan-out directory structure per
//! namespace: `{root}/{namespace}/{hex[0..2]}/{hex[2..4]}/{hex}`.
//!
//! The file's modification time doubles as the blob's last-access time:
//! it is set on write and refreshed on every successful `get`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use cairn_types::{ContentHash, NamespaceId};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobInfo, BlobStore, PutOutcome};

const TMP_EXTENSION: &str = "tmp";

/// File-based blob store.
///
/// Writes are atomic: data goes to a uniquely named temporary file in the
/// target directory first and is then renamed into place, so concurrent
/// writers of the same hash never observe a partial blob.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding every namespace of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &NamespaceId) -> PathBuf {
        self.root.join(namespace.as_str())
    }

    fn blob_path(&self, namespace: &NamespaceId, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.namespace_dir(namespace)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn put(
        &self,
        namespace: &NamespaceId,
        hash: ContentHash,
        data: Bytes,
    ) -> StoreResult<PutOutcome> {
        let computed = ContentHash::of(&data);
        if computed != hash {
            return Err(StoreError::HashMismatch {
                expected: hash,
                computed,
            });
        }

        let path = self.blob_path(namespace, &hash);
        if tokio::fs::try_exists(&path).await? {
            return Ok(PutOutcome::AlreadyExists);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension(format!("{:016x}.{TMP_EXTENSION}", rand::random::<u64>()));
        if let Err(e) = tokio::fs::write(&tmp_path, &data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(%namespace, hash = %hash.short_hex(), size = data.len(), "stored blob");
        Ok(PutOutcome::Stored)
    }

    async fn get(
        &self,
        namespace: &NamespaceId,
        hash: &ContentHash,
    ) -> StoreResult<Option<Bytes>> {
        let path = self.blob_path(namespace, hash);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let touched = tokio::task::spawn_blocking(move || touch(&path))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Err(e) = touched {
            // The blob was read; a stale access time only makes it an earlier
            // eviction candidate.
            warn!(%namespace, hash = %hash.short_hex(), error = %e, "failed to refresh access time");
        }
        Ok(Some(Bytes::from(data)))
    }

    async fn exists(&self, namespace: &NamespaceId, hash: &ContentHash) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(namespace, hash)).await?)
    }

    async fn delete(&self, namespace: &NamespaceId, hash: &ContentHash) -> StoreResult<bool> {
        match tokio::fs::remove_file(self.blob_path(namespace, hash)).await {
            Ok(()) => {
                debug!(%namespace, hash = %hash.short_hex(), "deleted blob file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn enumerate(&self, namespace: &NamespaceId) -> StoreResult<Vec<BlobInfo>> {
        let dir = self.namespace_dir(namespace);
        tokio::task::spawn_blocking(move || scan_namespace(&dir))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
    }

    async fn namespaces(&self) -> StoreResult<Vec<NamespaceId>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(ns) = NamespaceId::new(name) {
                    names.push(ns);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn touch(path: &Path) -> std::io::Result<()> {
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

/// Walk the fan-out under one namespace directory. Temporary files and
/// anything whose name is not a full hex hash are skipped.
fn scan_namespace(dir: &Path) -> StoreResult<Vec<BlobInfo>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut blobs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(3).max_depth(3) {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => StoreError::Io(io),
            None => StoreError::Backend("directory walk failed".into()),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(hash) = entry
            .file_name()
            .to_str()
            .and_then(|name| ContentHash::from_hex(name).ok())
        else {
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Deleted between listing and stat.
            Err(_) => continue,
        };
        blobs.push(BlobInfo {
            hash,
            size: metadata.len(),
            last_access: metadata.modified()?,
        });
    }
    Ok(blobs)
}
