use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use cairn_store::{BlobInfo, BlobStore};
use cairn_tree::{TreeError, TreeReader};
use cairn_types::{is_cancelled, CancelSignal, ContentHash, NamespaceId};
use tracing::{debug, info, warn};

use crate::config::GcConfig;
use crate::error::{GcError, GcResult};

/// Outcome of one collection run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub scanned: usize,
    pub total_bytes: u64,
    /// Objects old enough to evict and not protected.
    pub eligible: usize,
    pub deleted: usize,
    pub bytes_freed: u64,
    /// Deletes that failed and were skipped.
    pub failed: usize,
    /// Scanned objects reachable from a protected root.
    pub protected: usize,
    pub remaining_bytes: u64,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

struct ProtectedRoots {
    reader: TreeReader,
    roots: Vec<ContentHash>,
}

/// Keeps a namespace under its byte ceiling by evicting the least recently
/// accessed objects.
///
/// Without protected roots the only safety margin is the grace period: an
/// object read or written within it is never evicted. With protected roots,
/// every node reachable from them is also kept.
pub struct NamespaceGarbageCollector {
    store: Arc<dyn BlobStore>,
    config: GcConfig,
    protected: Option<ProtectedRoots>,
}

impl NamespaceGarbageCollector {
    /// A collector over `store`. Fails if `config` does not validate.
    pub fn new(store: Arc<dyn BlobStore>, config: GcConfig) -> GcResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            protected: None,
        })
    }

    /// Exclude everything reachable from `roots` in the reader's namespace.
    pub fn with_protected_roots(
        mut self,
        reader: TreeReader,
        roots: impl IntoIterator<Item = ContentHash>,
    ) -> Self {
        self.protected = Some(ProtectedRoots {
            reader,
            roots: roots.into_iter().collect(),
        });
        self
    }

    /// The configuration runs are bounded by.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Run one collection over `namespace` as of now.
    pub async fn collect(
        &self,
        namespace: &NamespaceId,
        cancel: &CancelSignal,
    ) -> GcResult<GcReport> {
        self.collect_at(namespace, SystemTime::now(), cancel).await
    }

    /// Run one collection, judging ages against `now`.
    pub async fn collect_at(
        &self,
        namespace: &NamespaceId,
        now: SystemTime,
        cancel: &CancelSignal,
    ) -> GcResult<GcReport> {
        let objects = self.store.enumerate(namespace).await?;
        let mut report = GcReport {
            scanned: objects.len(),
            total_bytes: objects.iter().map(|o| o.size).sum(),
            ..GcReport::default()
        };
        let ceiling = self.config.max_namespace_bytes;

        if report.total_bytes <= ceiling {
            report.remaining_bytes = report.total_bytes;
            debug!(
                namespace = %namespace,
                bytes = report.total_bytes,
                ceiling,
                "namespace under ceiling"
            );
            return Ok(report);
        }

        let marked = self.mark(namespace, cancel).await?;
        report.protected = objects.iter().filter(|o| marked.contains(&o.hash)).count();

        let victims = self.select_victims(&objects, &marked, now, report.total_bytes, &mut report);
        self.delete(namespace, &victims, cancel, &mut report).await;
        report.remaining_bytes = report.total_bytes - report.bytes_freed;

        info!(
            namespace = %namespace,
            scanned = report.scanned,
            deleted = report.deleted,
            freed = report.bytes_freed,
            failed = report.failed,
            remaining = report.remaining_bytes,
            cancelled = report.cancelled,
            "garbage collection finished"
        );
        Ok(report)
    }

    /// Collect every namespace the store knows about.
    pub async fn collect_all(
        &self,
        cancel: &CancelSignal,
    ) -> GcResult<Vec<(NamespaceId, GcReport)>> {
        let mut reports = Vec::new();
        for namespace in self.store.namespaces().await? {
            if is_cancelled(cancel) {
                break;
            }
            let report = self.collect(&namespace, cancel).await?;
            reports.push((namespace, report));
        }
        Ok(reports)
    }

    /// Everything reachable from the protected roots, if they belong to
    /// `namespace`.
    async fn mark(
        &self,
        namespace: &NamespaceId,
        cancel: &CancelSignal,
    ) -> GcResult<HashSet<ContentHash>> {
        let mut marked = HashSet::new();
        let Some(protected) = &self.protected else {
            return Ok(marked);
        };
        if protected.reader.namespace() != namespace {
            return Ok(marked);
        }

        let mut pending = protected.roots.clone();
        while let Some(hash) = pending.pop() {
            if !marked.insert(hash) {
                continue;
            }
            if is_cancelled(cancel) {
                return Err(GcError::Cancelled);
            }
            match protected.reader.references(&hash).await {
                Ok(children) => pending.extend(children),
                Err(TreeError::MissingReference(missing)) => {
                    warn!(hash = %missing.short_hex(), "protected node missing from store");
                }
                // Opaque blobs and corrupt nodes stay protected but are not descended.
                Err(e @ (TreeError::MalformedNode { .. } | TreeError::UnexpectedKind { .. })) => {
                    warn!(hash = %hash.short_hex(), error = %e, "protected object is not a tree node");
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(namespace = %namespace, marked = marked.len(), "protected roots marked");
        Ok(marked)
    }

    fn select_victims<'a>(
        &self,
        objects: &'a [BlobInfo],
        marked: &HashSet<ContentHash>,
        now: SystemTime,
        total: u64,
        report: &mut GcReport,
    ) -> Vec<&'a BlobInfo> {
        let grace = self.config.grace_period();
        let mut eligible: Vec<&BlobInfo> = objects
            .iter()
            .filter(|o| !marked.contains(&o.hash))
            .filter(|o| now.duration_since(o.last_access).is_ok_and(|age| age >= grace))
            .collect();
        eligible.sort_by(|a, b| a.last_access.cmp(&b.last_access).then(a.hash.cmp(&b.hash)));
        report.eligible = eligible.len();

        let mut projected = total;
        let mut victims = Vec::new();
        for info in eligible {
            if projected <= self.config.max_namespace_bytes {
                break;
            }
            projected -= info.size;
            victims.push(info);
        }
        victims
    }

    async fn delete(
        &self,
        namespace: &NamespaceId,
        victims: &[&BlobInfo],
        cancel: &CancelSignal,
        report: &mut GcReport,
    ) {
        for batch in victims.chunks(self.config.batch_size) {
            if is_cancelled(cancel) {
                report.cancelled = true;
                break;
            }
            for info in batch {
                match self.store.delete(namespace, &info.hash).await {
                    Ok(true) => {
                        report.deleted += 1;
                        report.bytes_freed += info.size;
                    }
                    Ok(false) => {
                        debug!(hash = %info.hash.short_hex(), "object already gone");
                    }
                    Err(e) => {
                        warn!(hash = %info.hash.short_hex(), error = %e, "delete failed, skipping");
                        report.failed += 1;
                    }
                }
            }
            tokio::task::yield_now().await;
        }
    }
}

impl std::fmt::Debug for NamespaceGarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceGarbageCollector")
            .field("config", &self.config)
            .field(
                "protected_roots",
                &self.protected.as_ref().map_or(0, |p| p.roots.len()),
            )
            .finish()
    }
}
