//! Zip archive import and export.
//!
//! The executable bit travels as unix mode bits (`0o755` or `0o644`).
//! Directory entries are written explicitly so empty directories survive.

use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use cairn_chunk::TreeOptions;
use cairn_tree::{ChunkedDataWriter, TreeError, TreeReader, TreeWriter};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::directory::DirectoryTree;
use crate::entry::FileFlags;
use crate::error::DirResult;
use crate::import::ImportStats;

const READ_BLOCK_SIZE: usize = 64 * 1024;

/// Pack the whole tree into an in-memory zip archive.
pub async fn export_archive(tree: &mut DirectoryTree, reader: &TreeReader) -> DirResult<Bytes> {
    let listing = tree.walk().await?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for dir in &listing.directories {
        zip.add_directory(format!("{dir}/"), entry_options(0o755))?;
    }
    for (path, entry) in &listing.files {
        zip.start_file(path.as_str(), entry_options(entry.flags.unix_mode()))?;
        reader
            .visit_leaves(&entry.root, |data| zip.write_all(data).map_err(TreeError::Io))
            .await?;
    }

    let bytes = zip.finish()?.into_inner();
    info!(
        files = listing.files.len(),
        directories = listing.directories.len(),
        bytes = bytes.len(),
        "archive exported"
    );
    Ok(Bytes::from(bytes))
}

fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode)
}

/// Unpack a zip archive into `tree`, chunking each file through `writer`.
///
/// Paths follow [`DirectoryTree::add_file`] rules; a collision aborts the
/// import with the tree holding the entries merged so far.
pub async fn import_archive(
    tree: &mut DirectoryTree,
    writer: &mut TreeWriter,
    options: &TreeOptions,
    archive: Bytes,
) -> DirResult<ImportStats> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut directories = Vec::new();
    let mut files = Vec::new();
    let mut block = vec![0u8; READ_BLOCK_SIZE];

    for index in 0..zip.len() {
        {
            let mut entry = zip.by_index(index)?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                directories.push(name);
            } else {
                let flags = entry
                    .unix_mode()
                    .map(FileFlags::from_unix_mode)
                    .unwrap_or(FileFlags::NONE);
                let mut builder = ChunkedDataWriter::new(*options)?;
                loop {
                    let n = entry.read(&mut block)?;
                    if n == 0 {
                        break;
                    }
                    builder.append(writer, &block[..n])?;
                }
                let root = builder.complete(writer)?;
                debug!(path = %name, length = root.length, "archive entry chunked");
                files.push((name, flags, root));
            }
        }
        writer.flush_if_needed().await?;
    }
    let flushed = writer.flush().await?;

    let mut stats = ImportStats {
        directories: directories.len(),
        nodes_written: flushed.nodes_written,
        ..ImportStats::default()
    };
    for dir in &directories {
        tree.add_directory(dir).await?;
    }
    for (name, flags, root) in files {
        let root = writer.locate(&root);
        stats.files += 1;
        stats.bytes += root.length;
        tree.add_file(&name, flags, root.length, root).await?;
    }

    info!(
        files = stats.files,
        directories = stats.directories,
        bytes = stats.bytes,
        "archive imported"
    );
    Ok(stats)
}
