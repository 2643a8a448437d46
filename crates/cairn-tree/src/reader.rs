use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use cairn_store::BlobStore;
use cairn_types::{is_cancelled, CancelSignal, ContentHash, NamespaceId};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::cache::NodeCache;
use crate::codec::decode_node;
use crate::error::{TreeError, TreeResult};
use crate::handle::NodeHandle;
use crate::node::Node;

/// Resolves handles to decoded nodes within one namespace.
///
/// Cheap to clone; clones share the store and the node cache.
#[derive(Clone)]
pub struct TreeReader {
    store: Arc<dyn BlobStore>,
    namespace: NamespaceId,
    cache: Arc<NodeCache>,
}

impl TreeReader {
    /// A reader over `namespace`. Readers sharing `cache` share fetched nodes.
    pub fn new(store: Arc<dyn BlobStore>, namespace: NamespaceId, cache: Arc<NodeCache>) -> Self {
        Self {
            store,
            namespace,
            cache,
        }
    }

    /// Namespace this reader resolves hashes in.
    pub fn namespace(&self) -> &NamespaceId {
        &self.namespace
    }

    /// The injected node cache.
    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    /// Fetch, verify and decode the node stored under `hash`.
    pub async fn read_node(&self, hash: &ContentHash) -> TreeResult<Arc<Node>> {
        let hash = *hash;
        self.cache
            .get_or_fetch(hash, || async move {
                debug!(namespace = %self.namespace, hash = %hash.short_hex(), "node cache miss");
                let data = self
                    .store
                    .get(&self.namespace, &hash)
                    .await?
                    .ok_or(TreeError::MissingReference(hash))?;
                decode_node(&hash, data)
            })
            .await
    }

    /// Resolve a handle, checking the node covers the length it claims.
    pub async fn read_handle(&self, handle: &NodeHandle) -> TreeResult<Arc<Node>> {
        let node = self.read_node(&handle.hash).await?;
        if node.length() != handle.length {
            return Err(TreeError::MalformedNode {
                hash: handle.hash,
                reason: format!(
                    "covers {} bytes, parent recorded {}",
                    node.length(),
                    handle.length
                ),
            });
        }
        Ok(node)
    }

    /// Hashes directly referenced by the node under `hash`.
    pub async fn references(&self, hash: &ContentHash) -> TreeResult<Vec<ContentHash>> {
        Ok(self.read_node(hash).await?.references().collect())
    }

    /// Walk the leaves under `root` in order.
    pub fn leaves(&self, root: &NodeHandle) -> LeafWalker {
        LeafWalker {
            reader: self.clone(),
            root: Some(root.clone()),
            stack: Vec::new(),
        }
    }

    /// Stream the data under `root` into `out`, one leaf at a time.
    /// Returns the number of bytes written.
    pub async fn copy_to<W>(
        &self,
        root: &NodeHandle,
        out: &mut W,
        cancel: &CancelSignal,
    ) -> TreeResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut walker = self.leaves(root);
        let mut written = 0u64;
        while let Some(data) = walker.next().await? {
            if is_cancelled(cancel) {
                return Err(TreeError::Cancelled);
            }
            out.write_all(&data).await?;
            written += data.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }

    /// Read the data under `root` into memory.
    pub async fn read_all(&self, root: &NodeHandle) -> TreeResult<Bytes> {
        let capacity = usize::try_from(root.length).unwrap_or(0);
        let mut buf = BytesMut::with_capacity(capacity);
        let mut walker = self.leaves(root);
        while let Some(data) = walker.next().await? {
            buf.extend_from_slice(&data);
        }
        Ok(buf.freeze())
    }

    /// Call `visit` with each leaf's data in order.
    pub async fn visit_leaves<F>(&self, root: &NodeHandle, mut visit: F) -> TreeResult<()>
    where
        F: FnMut(&[u8]) -> TreeResult<()>,
    {
        let mut walker = self.leaves(root);
        while let Some(data) = walker.next().await? {
            visit(&data)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeReader")
            .field("namespace", &self.namespace)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Depth-first iterator over the leaves of a chunked tree.
///
/// Holds only the interior nodes on the path to the current leaf, so memory
/// stays proportional to tree depth rather than file size.
pub struct LeafWalker {
    reader: TreeReader,
    root: Option<NodeHandle>,
    stack: Vec<(Arc<Node>, usize)>,
}

impl LeafWalker {
    /// Data of the next leaf, or `None` once the tree is exhausted.
    pub async fn next(&mut self) -> TreeResult<Option<Bytes>> {
        if let Some(root) = self.root.take() {
            if let Some(data) = self.enter(&root).await? {
                return Ok(Some(data));
            }
        }

        loop {
            let next = match self.stack.last_mut() {
                None => return Ok(None),
                Some((node, index)) => {
                    let child = node.children().get(*index).cloned();
                    *index += 1;
                    child
                }
            };
            match next {
                Some(child) => {
                    if let Some(data) = self.enter(&child).await? {
                        return Ok(Some(data));
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    async fn enter(&mut self, handle: &NodeHandle) -> TreeResult<Option<Bytes>> {
        let node = self.reader.read_handle(handle).await?;
        match node.as_ref() {
            Node::Leaf(leaf) => Ok(Some(leaf.data.clone())),
            Node::Interior(_) => {
                self.stack.push((node, 0));
                Ok(None)
            }
            Node::Directory(_) => Err(TreeError::UnexpectedKind {
                hash: handle.hash,
                found: "directory",
                expected: "leaf or interior",
            }),
        }
    }
}
