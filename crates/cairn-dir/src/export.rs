//! Bulk export of a [`DirectoryTree`] to the filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_tree::{NodeHandle, TreeReader};
use cairn_types::{is_cancelled, CancelSignal};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::directory::DirectoryTree;
use crate::entry::FileFlags;
use crate::error::{DirError, DirResult};

pub const DEFAULT_EXPORT_CONCURRENCY: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Write every directory and file of `tree` under `dest`, streaming file
/// content leaf by leaf. At most `max_concurrency` files are written at once.
pub async fn export_directory(
    tree: &mut DirectoryTree,
    reader: &TreeReader,
    dest: &Path,
    max_concurrency: usize,
    cancel: &CancelSignal,
) -> DirResult<ExportStats> {
    let listing = tree.walk().await?;

    tokio::fs::create_dir_all(dest).await?;
    for dir in &listing.directories {
        tokio::fs::create_dir_all(native_path(dest, dir)).await?;
    }

    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut stats = ExportStats {
        directories: listing.directories.len(),
        ..ExportStats::default()
    };

    for (path, entry) in listing.files {
        if is_cancelled(cancel) {
            return Err(DirError::Cancelled);
        }
        // The semaphore is never closed.
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DirError::Cancelled)?;
        let reader = reader.clone();
        let target = native_path(dest, &path);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            export_file(&reader, &entry.root, &target, entry.flags, &cancel).await
        });
        stats.files += 1;
    }

    while let Some(joined) = tasks.join_next().await {
        stats.bytes += joined??;
    }

    info!(
        dest = %dest.display(),
        files = stats.files,
        directories = stats.directories,
        bytes = stats.bytes,
        "directory exported"
    );
    Ok(stats)
}

async fn export_file(
    reader: &TreeReader,
    root: &NodeHandle,
    target: &Path,
    flags: FileFlags,
    cancel: &CancelSignal,
) -> DirResult<u64> {
    let mut file = tokio::fs::File::create(target).await?;
    let written = reader.copy_to(root, &mut file, cancel).await?;
    drop(file);
    set_mode(target, flags).await?;
    debug!(path = %target.display(), bytes = written, "file exported");
    Ok(written)
}

#[cfg(unix)]
async fn set_mode(target: &Path, flags: FileFlags) -> DirResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(flags.unix_mode());
    tokio::fs::set_permissions(target, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_target: &Path, _flags: FileFlags) -> DirResult<()> {
    Ok(())
}

fn native_path(dest: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(dest.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use cairn_chunk::TreeOptions;
    use cairn_store::InMemoryBlobStore;
    use cairn_tree::{write_bytes, NodeCache, TreeWriter};
    use cairn_types::{cancel_pair, never_cancel, NamespaceId};

    use super::*;
    use crate::import::{import_directory, ImportOptions};

    async fn sample_tree() -> (DirectoryTree, TreeReader) {
        let store = Arc::new(InMemoryBlobStore::new());
        let ns = NamespaceId::new("export").unwrap();
        let mut writer = TreeWriter::new(store.clone(), ns.clone());
        let options = TreeOptions::default();

        let mut tree = DirectoryTree::new();
        for (path, data, flags) in [
            ("a.txt", &b"alpha"[..], FileFlags::NONE),
            ("bin/tool", &b"#!/bin/sh\necho hi\n"[..], FileFlags::EXECUTABLE),
            ("deep/er/still.txt", &b""[..], FileFlags::NONE),
        ] {
            let root = write_bytes(&mut writer, &options, data).await.unwrap();
            tree.add_file(path, flags, root.length, root).await.unwrap();
        }
        tree.add_directory("hollow").await.unwrap();
        writer.flush().await.unwrap();

        let reader = TreeReader::new(store, ns, Arc::new(NodeCache::new(64)));
        (tree, reader)
    }

    #[tokio::test]
    async fn exports_content_and_layout() {
        let (mut tree, reader) = sample_tree().await;
        let dest = tempfile::tempdir().unwrap();

        let stats = export_directory(&mut tree, &reader, dest.path(), 2, &never_cancel())
            .await
            .unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.bytes, 5 + 18);
        assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dest.path().join("deep/er/still.txt")).unwrap(), b"");
        assert!(dest.path().join("hollow").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executable_bit_is_exported() {
        use std::os::unix::fs::PermissionsExt;

        let (mut tree, reader) = sample_tree().await;
        let dest = tempfile::tempdir().unwrap();
        export_directory(&mut tree, &reader, dest.path(), 4, &never_cancel())
            .await
            .unwrap();

        let mode = |p: &str| {
            std::fs::metadata(dest.path().join(p))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("bin/tool"), 0o755);
        assert_eq!(mode("a.txt"), 0o644);
    }

    #[tokio::test]
    async fn import_export_roundtrip() {
        let (mut tree, reader) = sample_tree().await;
        let first = tempfile::tempdir().unwrap();
        export_directory(&mut tree, &reader, first.path(), 4, &never_cancel())
            .await
            .unwrap();

        let store = Arc::new(InMemoryBlobStore::new());
        let ns = NamespaceId::new("again").unwrap();
        let mut copy = DirectoryTree::new();
        import_directory(
            &mut copy,
            first.path(),
            store.clone(),
            &ns,
            &ImportOptions::default(),
            &never_cancel(),
        )
        .await
        .unwrap();

        let original = tree.walk().await.unwrap();
        let imported = copy.walk().await.unwrap();
        assert_eq!(original.directories, imported.directories);
        let names = |l: &crate::directory::TreeListing| {
            l.files
                .iter()
                .map(|(p, f)| (p.clone(), f.root.hash))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&original), names(&imported));
    }

    #[tokio::test]
    async fn cancelled_export_stops() {
        let (mut tree, reader) = sample_tree().await;
        let dest = tempfile::tempdir().unwrap();
        let (handle, signal) = cancel_pair();
        handle.send(true).unwrap();

        let err = export_directory(&mut tree, &reader, dest.path(), 1, &signal)
            .await
            .unwrap_err();
        assert!(matches!(err, DirError::Cancelled));
    }
}
