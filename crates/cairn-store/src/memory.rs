use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use cairn_types::{ContentHash, NamespaceId};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobInfo, BlobStore, PutOutcome};

struct Entry {
    data: Bytes,
    last_access: SystemTime,
}

type Namespace = HashMap<ContentHash, Entry>;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are held behind a `RwLock`;
/// [`Bytes`] clones are cheap so reads never copy payloads.
pub struct InMemoryBlobStore {
    namespaces: RwLock<HashMap<NamespaceId, Namespace>>,
}

impl InMemoryBlobStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs stored in `namespace`.
    pub fn len(&self, namespace: &NamespaceId) -> usize {
        self.namespaces
            .read()
            .expect("lock poisoned")
            .get(namespace)
            .map_or(0, HashMap::len)
    }

    /// Whether `namespace` holds no objects.
    pub fn is_empty(&self, namespace: &NamespaceId) -> bool {
        self.len(namespace) == 0
    }

    /// Total bytes stored in `namespace`.
    pub fn total_bytes(&self, namespace: &NamespaceId) -> u64 {
        self.namespaces
            .read()
            .expect("lock poisoned")
            .get(namespace)
            .map_or(0, |ns| ns.values().map(|e| e.data.len() as u64).sum())
    }

    /// Overwrite the last-access time of a blob. Returns `false` if absent.
    ///
    /// Lets tests and tools set up deterministic eviction order.
    pub fn touch(&self, namespace: &NamespaceId, hash: &ContentHash, at: SystemTime) -> bool {
        let mut map = self.namespaces.write().expect("lock poisoned");
        match map.get_mut(namespace).and_then(|ns| ns.get_mut(hash)) {
            Some(entry) => {
                entry.last_access = at;
                true
            }
            None => false,
        }
    }

    /// Sorted list of all hashes in `namespace`.
    pub fn all_hashes(&self, namespace: &NamespaceId) -> Vec<ContentHash> {
        let map = self.namespaces.read().expect("lock poisoned");
        let mut hashes: Vec<ContentHash> = map
            .get(namespace)
            .map(|ns| ns.keys().copied().collect())
            .unwrap_or_default();
        hashes.sort();
        hashes
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
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

        let mut map = self.namespaces.write().expect("lock poisoned");
        let ns = map.entry(namespace.clone()).or_default();
        if ns.contains_key(&hash) {
            return Ok(PutOutcome::AlreadyExists);
        }
        ns.insert(
            hash,
            Entry {
                data,
                last_access: SystemTime::now(),
            },
        );
        Ok(PutOutcome::Stored)
    }

    async fn get(
        &self,
        namespace: &NamespaceId,
        hash: &ContentHash,
    ) -> StoreResult<Option<Bytes>> {
        let mut map = self.namespaces.write().expect("lock poisoned");
        Ok(map
            .get_mut(namespace)
            .and_then(|ns| ns.get_mut(hash))
            .map(|entry| {
                entry.last_access = SystemTime::now();
                entry.data.clone()
            }))
    }

    async fn exists(&self, namespace: &NamespaceId, hash: &ContentHash) -> StoreResult<bool> {
        let map = self.namespaces.read().expect("lock poisoned");
        Ok(map.get(namespace).is_some_and(|ns| ns.contains_key(hash)))
    }

    async fn delete(&self, namespace: &NamespaceId, hash: &ContentHash) -> StoreResult<bool> {
        let mut map = self.namespaces.write().expect("lock poisoned");
        Ok(map
            .get_mut(namespace)
            .is_some_and(|ns| ns.remove(hash).is_some()))
    }

    async fn enumerate(&self, namespace: &NamespaceId) -> StoreResult<Vec<BlobInfo>> {
        let map = self.namespaces.read().expect("lock poisoned");
        let Some(ns) = map.get(namespace) else {
            return Ok(Vec::new());
        };
        Ok(ns
            .iter()
            .map(|(hash, entry)| BlobInfo {
                hash: *hash,
                size: entry.data.len() as u64,
                last_access: entry.last_access,
            })
            .collect())
    }

    async fn namespaces(&self) -> StoreResult<Vec<NamespaceId>> {
        let map = self.namespaces.read().expect("lock poisoned");
        let mut names: Vec<NamespaceId> = map
            .iter()
            .filter(|(_, ns)| !ns.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.namespaces.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryBlobStore")
            .field("namespace_count", &count)
            .finish()
    }
}
