//! Bulk import of a filesystem directory into a [`DirectoryTree`].
//!
//! Files are sharded by cumulative size across several writers, each a tokio
//! task with its own [`TreeWriter`]. Shards only meet at the store, where
//! writes are idempotent by content hash, and are merged into the tree once
//! every shard has flushed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_chunk::TreeOptions;
use cairn_store::BlobStore;
use cairn_tree::{write_stream, FlushStats, NodeHandle, TreeError, TreeWriter};
use cairn_types::{is_cancelled, CancelSignal, NamespaceId};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::directory::DirectoryTree;
use crate::entry::FileFlags;
use crate::error::{DirError, DirResult};

pub const DEFAULT_IMPORT_WRITERS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Number of concurrent writers files are sharded across.
    pub writers: usize,
    pub tree: TreeOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            writers: DEFAULT_IMPORT_WRITERS,
            tree: TreeOptions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub nodes_written: usize,
}

#[derive(Clone, Debug)]
struct SourceFile {
    /// `/`-joined path relative to the import base.
    path: String,
    abs: PathBuf,
    size: u64,
    flags: FileFlags,
}

/// Chunk every regular file under `base` into `store` and add it to `tree`
/// at its relative path. Directories are added too, so empty ones survive.
///
/// Non-UTF-8 names and symlinks are skipped.
pub async fn import_directory(
    tree: &mut DirectoryTree,
    base: &Path,
    store: Arc<dyn BlobStore>,
    namespace: &NamespaceId,
    options: &ImportOptions,
    cancel: &CancelSignal,
) -> DirResult<ImportStats> {
    options.tree.validate().map_err(TreeError::from)?;

    let root = base.to_path_buf();
    let (files, directories) = tokio::task::spawn_blocking(move || scan(&root)).await??;
    let total: u64 = files.iter().map(|f| f.size).sum();
    let shards = shard_by_size(files, options.writers.max(1));
    debug!(
        base = %base.display(),
        bytes = total,
        shards = shards.len(),
        "import scan complete"
    );

    let mut tasks = JoinSet::new();
    for shard in shards {
        let store = store.clone();
        let namespace = namespace.clone();
        let tree_options = options.tree;
        let cancel = cancel.clone();
        tasks.spawn(async move { import_shard(store, namespace, tree_options, shard, cancel).await });
    }

    let mut imported = Vec::new();
    let mut stats = ImportStats::default();
    while let Some(joined) = tasks.join_next().await {
        let (roots, flushed) = joined??;
        stats.nodes_written += flushed.nodes_written;
        imported.extend(roots);
    }
    if is_cancelled(cancel) {
        return Err(DirError::Cancelled);
    }

    imported.sort_by(|a, b| a.0.path.cmp(&b.0.path));
    for dir in &directories {
        tree.add_directory(dir).await?;
    }
    for (file, root) in imported {
        stats.files += 1;
        stats.bytes += root.length;
        tree.add_file(&file.path, file.flags, root.length, root).await?;
    }
    stats.directories = directories.len();

    info!(
        base = %base.display(),
        files = stats.files,
        directories = stats.directories,
        bytes = stats.bytes,
        nodes = stats.nodes_written,
        "directory imported"
    );
    Ok(stats)
}

async fn import_shard(
    store: Arc<dyn BlobStore>,
    namespace: NamespaceId,
    options: TreeOptions,
    files: Vec<SourceFile>,
    cancel: CancelSignal,
) -> DirResult<(Vec<(SourceFile, NodeHandle)>, FlushStats)> {
    let mut writer = TreeWriter::new(store, namespace);
    let mut roots = Vec::with_capacity(files.len());
    for file in files {
        let source = tokio::fs::File::open(&file.abs).await?;
        let root = write_stream(&mut writer, &options, source, &cancel).await?;
        debug!(path = %file.path, length = root.length, hash = %root.hash.short_hex(), "file chunked");
        roots.push((file, root));
    }
    writer.flush().await?;

    let located = roots
        .into_iter()
        .map(|(file, root)| {
            let root = writer.locate(&root);
            (file, root)
        })
        .collect();
    Ok((located, writer.totals()))
}

/// Collect regular files and directories under `base`, sorted by path.
fn scan(base: &Path) -> DirResult<(Vec<SourceFile>, Vec<String>)> {
    let mut files = Vec::new();
    let mut directories = Vec::new();

    for entry in WalkDir::new(base).min_depth(1).follow_links(false) {
        let entry = entry?;
        let Some(path) = relative_path(base, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping entry with non UTF-8 name");
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            directories.push(path);
        } else if file_type.is_file() {
            let metadata = entry.metadata()?;
            files.push(SourceFile {
                path,
                abs: entry.path().to_path_buf(),
                size: metadata.len(),
                flags: flags_of(&metadata),
            });
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    directories.sort();
    Ok((files, directories))
}

fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[cfg(unix)]
fn flags_of(metadata: &std::fs::Metadata) -> FileFlags {
    use std::os::unix::fs::PermissionsExt;
    FileFlags::from_unix_mode(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn flags_of(_metadata: &std::fs::Metadata) -> FileFlags {
    FileFlags::NONE
}

/// Split `files` (already in path order) into at most `writers` contiguous
/// shards of roughly equal cumulative size.
fn shard_by_size(files: Vec<SourceFile>, writers: usize) -> Vec<Vec<SourceFile>> {
    let total: u64 = files.iter().map(|f| f.size).sum();
    let per_shard = total.div_ceil(writers as u64).max(1);

    let mut shards: Vec<Vec<SourceFile>> = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0u64;
    for file in files {
        current_bytes += file.size;
        current.push(file);
        if current_bytes >= per_shard && shards.len() + 1 < writers {
            shards.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
    }
    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

#[cfg(test)]
mod tests {
    use cairn_chunk::ChunkingOptions;
    use cairn_store::InMemoryBlobStore;
    use cairn_tree::{NodeCache, TreeReader};
    use cairn_types::{cancel_pair, never_cancel};

    use super::*;

    fn source(path: &str, size: u64) -> SourceFile {
        SourceFile {
            path: path.into(),
            abs: PathBuf::from(path),
            size,
            flags: FileFlags::NONE,
        }
    }

    fn small_options(writers: usize) -> ImportOptions {
        ImportOptions {
            writers,
            tree: TreeOptions {
                leaf: ChunkingOptions::new(64, 512, 128),
                interior: ChunkingOptions::new(64, 256, 128),
            },
        }
    }

    fn populate(dir: &Path) {
        std::fs::create_dir_all(dir.join("src/nested")).unwrap();
        std::fs::create_dir_all(dir.join("empty")).unwrap();
        std::fs::write(dir.join("README.md"), b"# readme\n").unwrap();
        std::fs::write(dir.join("src/lib.rs"), vec![7u8; 5000]).unwrap();
        std::fs::write(dir.join("src/nested/data.bin"), (0..20_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>()).unwrap();
    }

    // -----------------------------------------------------------------------
    // Sharding
    // -----------------------------------------------------------------------

    #[test]
    fn shards_balance_by_size() {
        let files = vec![source("a", 10), source("b", 10), source("c", 10), source("d", 10)];
        let shards = shard_by_size(files, 2);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].len(), 2);
        assert_eq!(shards[1].len(), 2);
    }

    #[test]
    fn shards_never_exceed_writer_count() {
        let files = (0..10).map(|i| source(&i.to_string(), 100)).collect();
        let shards = shard_by_size(files, 3);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 10);
    }

    #[test]
    fn shards_handle_empty_files() {
        let files = vec![source("a", 0), source("b", 0)];
        let shards = shard_by_size(files, 4);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 2);
        assert!(shard_by_size(Vec::new(), 4).is_empty());
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn imports_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let store = Arc::new(InMemoryBlobStore::new());
        let ns = NamespaceId::new("import").unwrap();

        let mut tree = DirectoryTree::new();
        let stats = import_directory(
            &mut tree,
            dir.path(),
            store.clone(),
            &ns,
            &small_options(3),
            &never_cancel(),
        )
        .await
        .unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.directories, 3);
        assert_eq!(stats.bytes, 9 + 5000 + 20_000);
        assert!(stats.nodes_written > 0);

        let listing = tree.walk().await.unwrap();
        assert_eq!(listing.directories, vec!["empty", "src", "src/nested"]);

        let reader = TreeReader::new(store, ns, Arc::new(NodeCache::new(256)));
        let data = tree.find_file("src/nested/data.bin").await.unwrap().unwrap();
        assert!(data.root.is_located());
        let bytes = reader.read_all(&data.root).await.unwrap();
        assert_eq!(bytes.len(), 20_000);
        assert_eq!(bytes[300], (300 % 251) as u8);
    }

    #[tokio::test]
    async fn import_is_independent_of_writer_count() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let ns = NamespaceId::new("import").unwrap();

        let mut roots = Vec::new();
        for writers in [1, 4] {
            let store = Arc::new(InMemoryBlobStore::new());
            let mut tree = DirectoryTree::new();
            import_directory(&mut tree, dir.path(), store.clone(), &ns, &small_options(writers), &never_cancel())
                .await
                .unwrap();
            let mut writer = TreeWriter::new(store, ns.clone());
            roots.push(tree.collapse(&mut writer));
        }
        assert_eq!(roots[0], roots[1]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executable_bit_is_imported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("plain.txt"), b"text").unwrap();

        let mut tree = DirectoryTree::new();
        import_directory(
            &mut tree,
            dir.path(),
            Arc::new(InMemoryBlobStore::new()),
            &NamespaceId::new("exec").unwrap(),
            &ImportOptions::default(),
            &never_cancel(),
        )
        .await
        .unwrap();

        assert!(tree.find_file("run.sh").await.unwrap().unwrap().flags.is_executable());
        assert!(!tree.find_file("plain.txt").await.unwrap().unwrap().flags.is_executable());
    }

    #[tokio::test]
    async fn cancelled_import_leaves_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let (handle, signal) = cancel_pair();
        handle.send(true).unwrap();

        let mut tree = DirectoryTree::new();
        let err = import_directory(
            &mut tree,
            dir.path(),
            Arc::new(InMemoryBlobStore::new()),
            &NamespaceId::new("cancel").unwrap(),
            &small_options(2),
            &signal,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DirError::Cancelled));
        assert!(tree.root().is_empty());
    }
}
