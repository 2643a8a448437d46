use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use cairn_types::{ContentHash, NamespaceId};

use crate::error::StoreResult;

/// Result of a [`BlobStore::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The blob was new and has been written.
    Stored,
    /// A blob with this hash was already present; nothing was written.
    AlreadyExists,
}

/// One enumerated object, as seen by the garbage collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobInfo {
    pub hash: ContentHash,
    pub size: u64,
    pub last_access: SystemTime,
}

/// Namespaced content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. Two writers storing the same hash
///   concurrently is safe; both observe success.
/// - `put` rejects bytes that do not hash to the given key.
/// - `get` refreshes the last-access time reported by `enumerate`.
/// - Namespaces are fully independent: a hash present in one namespace says
///   nothing about another.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `hash`. Idempotent.
    async fn put(
        &self,
        namespace: &NamespaceId,
        hash: ContentHash,
        data: Bytes,
    ) -> StoreResult<PutOutcome>;

    /// Read a blob. Returns `Ok(None)` if it does not exist.
    async fn get(&self, namespace: &NamespaceId, hash: &ContentHash)
        -> StoreResult<Option<Bytes>>;

    /// Check whether a blob exists without touching its access time.
    async fn exists(&self, namespace: &NamespaceId, hash: &ContentHash) -> StoreResult<bool>;

    /// Delete a blob. Returns `true` if it existed.
    ///
    /// Intended for garbage collection only.
    async fn delete(&self, namespace: &NamespaceId, hash: &ContentHash) -> StoreResult<bool>;

    /// List every blob in a namespace with its size and last-access time.
    async fn enumerate(&self, namespace: &NamespaceId) -> StoreResult<Vec<BlobInfo>>;

    /// Every namespace that currently holds at least one blob.
    async fn namespaces(&self) -> StoreResult<Vec<NamespaceId>>;

    /// Check existence of many hashes at once.
    ///
    /// Default implementation calls `exists()` for each hash. Backends may
    /// override for fewer round-trips.
    async fn exists_batch(
        &self,
        namespace: &NamespaceId,
        hashes: &[ContentHash],
    ) -> StoreResult<Vec<bool>> {
        let mut found = Vec::with_capacity(hashes.len());
        for hash in hashes {
            found.push(self.exists(namespace, hash).await?);
        }
        Ok(found)
    }
}
