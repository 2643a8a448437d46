//! Bounded, single-flight cache of decoded nodes.
//!
//! Concurrent requests for the same hash share one fetch: the first caller
//! runs the fetch while the others wait on the same cell. Entries are
//! evicted oldest-inserted first once `capacity` is exceeded. Nodes are
//! immutable, so a cached node never goes stale.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cairn_types::ContentHash;
use tokio::sync::OnceCell;

use crate::error::TreeResult;
use crate::node::Node;

pub const DEFAULT_NODE_CAPACITY: usize = 4096;

type Cell = Arc<OnceCell<Arc<Node>>>;

struct Inner {
    cells: HashMap<ContentHash, Cell>,
    order: VecDeque<ContentHash>,
}

pub struct NodeCache {
    capacity: usize,
    inner: Mutex<Inner>,
    fetches: AtomicU64,
}

impl NodeCache {
    /// A cache holding at most `capacity` decoded nodes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                cells: HashMap::new(),
                order: VecDeque::new(),
            }),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of nodes currently cached or being fetched.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times a fetch closure has actually run.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Return the cached node for `hash`, running `fetch` at most once across
    /// all concurrent callers when it is absent.
    ///
    /// A failed fetch is not cached; the next caller tries again.
    pub async fn get_or_fetch<F, Fut>(&self, hash: ContentHash, fetch: F) -> TreeResult<Arc<Node>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TreeResult<Node>>,
    {
        let cell = self.cell(hash);
        let result = cell
            .get_or_try_init(|| async move {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                fetch().await.map(Arc::new)
            })
            .await
            .cloned();

        if result.is_err() {
            let mut inner = self.inner.lock().expect("lock poisoned");
            if inner
                .cells
                .get(&hash)
                .is_some_and(|current| Arc::ptr_eq(current, &cell) && !current.initialized())
            {
                inner.cells.remove(&hash);
                inner.order.retain(|h| *h != hash);
            }
        }
        result
    }

    fn cell(&self, hash: ContentHash) -> Cell {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if let Some(cell) = inner.cells.get(&hash) {
            return cell.clone();
        }

        let cell = Cell::default();
        inner.cells.insert(hash, cell.clone());
        inner.order.push_back(hash);
        while inner.cells.len() > self.capacity {
            match inner.order.pop_front() {
                // Waiters on an evicted in-flight cell keep their own Arc.
                Some(oldest) => {
                    inner.cells.remove(&oldest);
                }
                None => break,
            }
        }
        cell
    }

    /// Drop every cached node. Fetches in flight still complete for their callers.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.cells.clear();
        inner.order.clear();
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_CAPACITY)
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::TreeError;

    fn leaf(data: &'static [u8]) -> Node {
        Node::leaf(data)
    }

    #[tokio::test]
    async fn caches_after_first_fetch() {
        let cache = NodeCache::new(8);
        let hash = ContentHash::of(b"a");
        let first = cache
            .get_or_fetch(hash, || async { Ok(leaf(b"a")) })
            .await
            .unwrap();
        let second = cache
            .get_or_fetch(hash, || async { Err(TreeError::Cancelled) })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let cache = Arc::new(NodeCache::new(8));
        let hash = ContentHash::of(b"shared");

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let cache = cache.clone();
            tasks.spawn(async move {
                cache
                    .get_or_fetch(hash, || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(leaf(b"shared"))
                    })
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried() {
        let cache = NodeCache::new(8);
        let hash = ContentHash::of(b"flaky");
        let err = cache
            .get_or_fetch(hash, || async { Err(TreeError::MissingReference(hash)) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        cache
            .get_or_fetch(hash, || async { Ok(leaf(b"flaky")) })
            .await
            .unwrap();
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let cache = NodeCache::new(2);
        for name in [&b"one"[..], b"two", b"three"] {
            cache
                .get_or_fetch(ContentHash::of(name), || async move { Ok(Node::leaf(name)) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        // "one" was evicted and must be fetched again.
        cache
            .get_or_fetch(ContentHash::of(b"one"), || async { Ok(leaf(b"one")) })
            .await
            .unwrap();
        assert_eq!(cache.fetch_count(), 4);
    }
}
