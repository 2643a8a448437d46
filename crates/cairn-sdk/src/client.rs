use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use cairn_dir::{
    DirectoryTree, ExportStats, ImportOptions, ImportStats, Listing, TreeListing,
};
use cairn_gc::{GcReport, NamespaceGarbageCollector};
use cairn_store::{BlobStore, FileBlobStore, InMemoryBlobStore, PutOutcome};
use cairn_tree::{write_bytes, write_stream, Node, NodeCache, NodeHandle, TreeReader, TreeWriter};
use cairn_types::{BlobId, CancelSignal, ContentHash, NamespaceId};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{SdkError, SdkResult};

/// One namespace of a blob store, with the chunking, directory and GC
/// operations layered over it.
///
/// Cloning is cheap; clones share the store and the node cache.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn BlobStore>,
    namespace: NamespaceId,
    cache: Arc<NodeCache>,
    config: StorageConfig,
}

impl StorageClient {
    /// Open a file-backed store at `config.store_root`.
    pub fn open(config: StorageConfig) -> SdkResult<Self> {
        config.validate()?;
        let store = FileBlobStore::new(&config.store_root)?;
        info!(root = %config.store_root.display(), namespace = %config.namespace, "store opened");
        Self::with_store(Arc::new(store), config)
    }

    /// A client over a fresh in-memory store.
    pub fn in_memory(config: StorageConfig) -> SdkResult<Self> {
        Self::with_store(Arc::new(InMemoryBlobStore::new()), config)
    }

    /// A client over an existing store, for example one shared with other clients.
    pub fn with_store(store: Arc<dyn BlobStore>, config: StorageConfig) -> SdkResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            namespace: config.namespace_id()?,
            cache: Arc::new(NodeCache::new(config.cache.node_capacity)),
            config,
        })
    }

    /// The namespace every operation of this client addresses.
    pub fn namespace(&self) -> &NamespaceId {
        &self.namespace
    }

    /// The validated configuration this client was opened with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The underlying blob store.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// A tree reader for this namespace, sharing the client's node cache.
    pub fn reader(&self) -> TreeReader {
        TreeReader::new(self.store.clone(), self.namespace.clone(), self.cache.clone())
    }

    /// A fresh tree writer for this namespace. Nothing is stored until it is flushed.
    pub fn writer(&self) -> TreeWriter {
        TreeWriter::new(self.store.clone(), self.namespace.clone())
    }

    // ---- Opaque blobs ----

    /// Store `data` as one opaque blob keyed by its hash. Storing it again is a no-op.
    pub async fn put_blob(&self, data: Bytes) -> SdkResult<BlobId> {
        let id = BlobId::of(&data);
        let outcome = self.store.put(&self.namespace, *id.hash(), data).await?;
        debug!(blob = %id.hash().short_hex(), new = outcome == PutOutcome::Stored, "blob put");
        Ok(id)
    }

    /// Fetch a blob, refreshing its access time.
    pub async fn get_blob(&self, id: &BlobId) -> SdkResult<Option<Bytes>> {
        Ok(self.store.get(&self.namespace, id.hash()).await?)
    }

    /// Whether a blob exists, without refreshing its access time.
    pub async fn head_blob(&self, id: &BlobId) -> SdkResult<bool> {
        Ok(self.store.exists(&self.namespace, id.hash()).await?)
    }

    /// Remove a blob. Returns `false` if it was not stored.
    pub async fn delete_blob(&self, id: &BlobId) -> SdkResult<bool> {
        Ok(self.store.delete(&self.namespace, id.hash()).await?)
    }

    /// The subset of `ids` the store does not hold, in input order.
    pub async fn exists_batch(&self, ids: &[BlobId]) -> SdkResult<Vec<BlobId>> {
        let hashes: Vec<ContentHash> = ids.iter().map(|id| *id.hash()).collect();
        let found = self.store.exists_batch(&self.namespace, &hashes).await?;
        Ok(ids
            .iter()
            .zip(found)
            .filter(|(_, present)| !present)
            .map(|(id, _)| *id)
            .collect())
    }

    // ---- Chunked files ----

    /// Chunk a stream into the store and return its located root.
    pub async fn write_file<R>(&self, source: R, cancel: &CancelSignal) -> SdkResult<NodeHandle>
    where
        R: AsyncRead + Unpin,
    {
        let mut writer = self.writer();
        let root = write_stream(&mut writer, &self.config.tree, source, cancel).await?;
        writer.flush().await?;
        Ok(writer.locate(&root))
    }

    /// Chunk an in-memory buffer into the store and return its located root.
    pub async fn write_bytes(&self, data: &[u8]) -> SdkResult<NodeHandle> {
        let mut writer = self.writer();
        let root = write_bytes(&mut writer, &self.config.tree, data).await?;
        writer.flush().await?;
        Ok(writer.locate(&root))
    }

    /// Read a whole chunked file into memory.
    pub async fn read_file(&self, root: &NodeHandle) -> SdkResult<Bytes> {
        Ok(self.reader().read_all(root).await?)
    }

    /// Stream a file's content into `out`. Returns the bytes written.
    pub async fn copy_file<W>(
        &self,
        root: &NodeHandle,
        out: &mut W,
        cancel: &CancelSignal,
    ) -> SdkResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        Ok(self.reader().copy_to(root, out, cancel).await?)
    }

    /// Build a full handle for a stored node from its hash alone.
    pub async fn resolve(&self, hash: &ContentHash) -> SdkResult<NodeHandle> {
        let node = self.reader().read_node(hash).await?;
        Ok(NodeHandle::new(*hash, node.length()))
    }

    // ---- Directory trees ----

    /// Load the directory tree rooted at `root`.
    pub async fn open_tree(&self, root: &NodeHandle) -> SdkResult<DirectoryTree> {
        Ok(DirectoryTree::open(self.reader(), root).await?)
    }

    /// Persist `tree` and return its root directory handle.
    pub async fn commit_tree(&self, tree: &mut DirectoryTree) -> SdkResult<NodeHandle> {
        let mut writer = self.writer();
        let root = tree.collapse(&mut writer);
        writer.flush().await?;
        Ok(writer.locate(&root))
    }

    /// Import a filesystem directory as a new tree.
    pub async fn import_directory(
        &self,
        base: &Path,
        cancel: &CancelSignal,
    ) -> SdkResult<(NodeHandle, ImportStats)> {
        let options = ImportOptions {
            writers: self.config.import.writers,
            tree: self.config.tree,
        };
        let mut tree = DirectoryTree::new().with_reader(self.reader());
        let stats = cairn_dir::import_directory(
            &mut tree,
            base,
            self.store.clone(),
            &self.namespace,
            &options,
            cancel,
        )
        .await?;
        let root = self.commit_tree(&mut tree).await?;
        Ok((root, stats))
    }

    /// Write the tree at `root` under `dest`, creating it as needed.
    pub async fn export_directory(
        &self,
        root: &NodeHandle,
        dest: &Path,
        cancel: &CancelSignal,
    ) -> SdkResult<ExportStats> {
        let mut tree = self.open_tree(root).await?;
        Ok(cairn_dir::export_directory(
            &mut tree,
            &self.reader(),
            dest,
            self.config.export.max_concurrency,
            cancel,
        )
        .await?)
    }

    /// Pack the tree at `root` into an in-memory zip archive.
    pub async fn export_archive(&self, root: &NodeHandle) -> SdkResult<Bytes> {
        let mut tree = self.open_tree(root).await?;
        Ok(cairn_dir::export_archive(&mut tree, &self.reader()).await?)
    }

    /// Import a zip archive as a new tree.
    pub async fn import_archive(&self, archive: Bytes) -> SdkResult<(NodeHandle, ImportStats)> {
        let mut tree = DirectoryTree::new().with_reader(self.reader());
        let mut writer = self.writer();
        let stats =
            cairn_dir::import_archive(&mut tree, &mut writer, &self.config.tree, archive).await?;
        let root = self.commit_tree(&mut tree).await?;
        Ok((root, stats))
    }

    /// Contents of one directory inside the tree at `root`.
    pub async fn list(&self, root: &NodeHandle, path: &str) -> SdkResult<Listing> {
        let mut tree = self.open_tree(root).await?;
        tree.list(path)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("directory {path:?}")))
    }

    /// Every path in the tree at `root`.
    pub async fn walk(&self, root: &NodeHandle) -> SdkResult<TreeListing> {
        let mut tree = self.open_tree(root).await?;
        Ok(tree.walk().await?)
    }

    /// Read one file out of the tree at `root`.
    pub async fn read_path(&self, root: &NodeHandle, path: &str) -> SdkResult<Bytes> {
        let mut tree = self.open_tree(root).await?;
        let entry = tree
            .find_file(path)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("file {path:?}")))?;
        self.read_file(&entry.root).await
    }

    // ---- Garbage collection ----

    /// Evict least recently used objects until the namespace fits its
    /// ceiling, never touching anything reachable from `protected`.
    pub async fn collect_garbage(
        &self,
        protected: &[ContentHash],
        cancel: &CancelSignal,
    ) -> SdkResult<GcReport> {
        let mut gc = NamespaceGarbageCollector::new(self.store.clone(), self.config.gc.clone())?;
        if !protected.is_empty() {
            gc = gc.with_protected_roots(self.reader(), protected.iter().copied());
        }
        let report = gc.collect(&self.namespace, cancel).await?;
        // Evicted nodes may still sit in the cache.
        if report.deleted > 0 {
            self.cache.clear();
        }
        Ok(report)
    }

    /// Whether `hash` names a directory node.
    pub async fn is_directory(&self, hash: &ContentHash) -> SdkResult<bool> {
        let node = self.reader().read_node(hash).await?;
        Ok(matches!(node.as_ref(), Node::Directory(_)))
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("namespace", &self.namespace)
            .field("cache", &self.cache)
            .finish()
    }
}
