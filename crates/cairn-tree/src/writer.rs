use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use cairn_store::{BlobStore, PutOutcome};
use cairn_types::{ContentHash, Locator, NamespaceId};
use tracing::debug;

use crate::codec::encode_node;
use crate::error::TreeResult;
use crate::handle::NodeHandle;
use crate::node::Node;

/// Pending bytes above which [`TreeWriter::flush_if_needed`] flushes.
pub const DEFAULT_BATCH_LIMIT: usize = 4 * 1024 * 1024;

/// Counters returned by a flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Nodes the store did not have before.
    pub nodes_written: usize,
    /// Nodes the store already held (written by another writer or run).
    pub nodes_present: usize,
    pub bytes_written: u64,
}

impl FlushStats {
    fn merge(&mut self, other: FlushStats) {
        self.nodes_written += other.nodes_written;
        self.nodes_present += other.nodes_present;
        self.bytes_written += other.bytes_written;
    }
}

/// Encodes nodes, buffers them, and persists them to a namespace in
/// batches.
///
/// A writer is owned by one builder at a time. Writing a node whose hash the
/// writer has already seen is a no-op, so identical chunks within one write
/// cost nothing. Pending nodes are flushed in the order they were written,
/// which puts children in the store before their parents.
pub struct TreeWriter {
    store: Arc<dyn BlobStore>,
    namespace: NamespaceId,
    pending: Vec<(ContentHash, Bytes)>,
    pending_bytes: usize,
    seen: HashSet<ContentHash>,
    flushed: HashSet<ContentHash>,
    batch_limit: usize,
    totals: FlushStats,
}

impl TreeWriter {
    /// A writer with the default batch limit.
    pub fn new(store: Arc<dyn BlobStore>, namespace: NamespaceId) -> Self {
        Self::with_batch_limit(store, namespace, DEFAULT_BATCH_LIMIT)
    }

    pub fn with_batch_limit(
        store: Arc<dyn BlobStore>,
        namespace: NamespaceId,
        batch_limit: usize,
    ) -> Self {
        Self {
            store,
            namespace,
            pending: Vec::new(),
            pending_bytes: 0,
            seen: HashSet::new(),
            flushed: HashSet::new(),
            batch_limit,
            totals: FlushStats::default(),
        }
    }

    /// Namespace nodes are flushed into.
    pub fn namespace(&self) -> &NamespaceId {
        &self.namespace
    }

    /// The store nodes are flushed to.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Encode and queue a node, returning its handle.
    pub fn write_node(&mut self, node: &Node) -> NodeHandle {
        let encoded = encode_node(node);
        let hash = ContentHash::of(&encoded);
        let handle = NodeHandle::new(hash, node.length());

        if self.seen.insert(hash) {
            debug!(
                hash = %hash.short_hex(),
                kind = node.kind().as_str(),
                size = encoded.len(),
                "queued node"
            );
            self.pending_bytes += encoded.len();
            self.pending.push((hash, Bytes::from(encoded)));
        }
        handle
    }

    /// Encoded bytes queued since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Nodes queued since the last flush.
    pub fn pending_nodes(&self) -> usize {
        self.pending.len()
    }

    /// Totals across every flush this writer has performed.
    pub fn totals(&self) -> FlushStats {
        self.totals
    }

    /// Persist every pending node, in write order.
    ///
    /// On failure, nodes stored before the failing one are dropped from the
    /// queue and the rest remain pending.
    pub async fn flush(&mut self) -> TreeResult<FlushStats> {
        let mut stats = FlushStats::default();
        let mut done = 0;
        let mut result = Ok(());

        for (hash, data) in &self.pending {
            let size = data.len() as u64;
            match self.store.put(&self.namespace, *hash, data.clone()).await {
                Ok(PutOutcome::Stored) => {
                    stats.nodes_written += 1;
                    stats.bytes_written += size;
                }
                Ok(PutOutcome::AlreadyExists) => stats.nodes_present += 1,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            self.flushed.insert(*hash);
            self.pending_bytes -= data.len();
            done += 1;
        }
        self.pending.drain(..done);
        self.totals.merge(stats);
        result?;

        if stats.nodes_written + stats.nodes_present > 0 {
            debug!(
                namespace = %self.namespace,
                written = stats.nodes_written,
                present = stats.nodes_present,
                bytes = stats.bytes_written,
                "flushed nodes"
            );
        }
        Ok(stats)
    }

    /// Flush only if the pending buffer has grown past the batch limit.
    pub async fn flush_if_needed(&mut self) -> TreeResult<Option<FlushStats>> {
        if self.pending_bytes >= self.batch_limit {
            Ok(Some(self.flush().await?))
        } else {
            Ok(None)
        }
    }

    /// Attach a locator to a handle whose node has been flushed. Handles of
    /// unflushed nodes are returned unchanged.
    pub fn locate(&self, handle: &NodeHandle) -> NodeHandle {
        if self.flushed.contains(&handle.hash) {
            handle
                .clone()
                .with_locator(Locator::new(&self.namespace, &handle.hash))
        } else {
            handle.clone()
        }
    }
}

impl std::fmt::Debug for TreeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWriter")
            .field("namespace", &self.namespace)
            .field("pending_nodes", &self.pending.len())
            .field("pending_bytes", &self.pending_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use cairn_store::InMemoryBlobStore;

    use super::*;

    fn setup() -> (Arc<InMemoryBlobStore>, TreeWriter) {
        let store = Arc::new(InMemoryBlobStore::new());
        let writer = TreeWriter::new(store.clone(), NamespaceId::new("test").unwrap());
        (store, writer)
    }

    #[tokio::test]
    async fn write_then_flush_stores_node() {
        let (store, mut writer) = setup();
        let handle = writer.write_node(&Node::leaf(&b"chunk"[..]));
        assert_eq!(handle.length, 5);
        assert!(store.is_empty(writer.namespace()));

        let stats = writer.flush().await.unwrap();
        assert_eq!(stats.nodes_written, 1);
        assert_eq!(writer.pending_nodes(), 0);
        assert_eq!(writer.pending_bytes(), 0);
        assert!(store.exists(writer.namespace(), &handle.hash).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_nodes_are_queued_once() {
        let (_store, mut writer) = setup();
        let a = writer.write_node(&Node::leaf(&b"same"[..]));
        let b = writer.write_node(&Node::leaf(&b"same"[..]));
        assert_eq!(a, b);
        assert_eq!(writer.pending_nodes(), 1);
    }

    #[tokio::test]
    async fn rewriting_after_flush_is_a_noop() {
        let (_store, mut writer) = setup();
        writer.write_node(&Node::leaf(&b"once"[..]));
        writer.flush().await.unwrap();
        writer.write_node(&Node::leaf(&b"once"[..]));
        assert_eq!(writer.pending_nodes(), 0);
    }

    #[tokio::test]
    async fn second_writer_sees_existing_nodes() {
        let (store, mut first) = setup();
        first.write_node(&Node::leaf(&b"shared"[..]));
        first.flush().await.unwrap();

        let mut second = TreeWriter::new(store, NamespaceId::new("test").unwrap());
        second.write_node(&Node::leaf(&b"shared"[..]));
        let stats = second.flush().await.unwrap();
        assert_eq!(stats.nodes_written, 0);
        assert_eq!(stats.nodes_present, 1);
    }

    #[tokio::test]
    async fn flush_if_needed_respects_batch_limit() {
        let store = Arc::new(InMemoryBlobStore::new());
        let mut writer =
            TreeWriter::with_batch_limit(store, NamespaceId::new("test").unwrap(), 64);
        writer.write_node(&Node::leaf(&b"small"[..]));
        assert!(writer.flush_if_needed().await.unwrap().is_none());

        writer.write_node(&Node::leaf(vec![1u8; 100]));
        let stats = writer.flush_if_needed().await.unwrap().unwrap();
        assert_eq!(stats.nodes_written, 2);
        assert_eq!(writer.totals().nodes_written, 2);
    }

    #[tokio::test]
    async fn locate_only_after_flush() {
        let (_store, mut writer) = setup();
        let handle = writer.write_node(&Node::leaf(&b"where"[..]));
        assert!(!writer.locate(&handle).is_located());

        writer.flush().await.unwrap();
        let located = writer.locate(&handle);
        assert_eq!(
            located.locator,
            Some(Locator::new(writer.namespace(), &handle.hash))
        );
    }
}
