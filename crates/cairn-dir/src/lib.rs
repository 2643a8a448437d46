//! Directory trees over chunked content.
//!
//! A [`DirectoryTree`] maps paths to [`FileEntry`] values whose content is a
//! chunked tree root. Trees are mutated in memory, then collapsed bottom-up
//! into Directory nodes that live in the same store as the file data.
//!
//! # Bulk Operations
//!
//! - [`import_directory`] -- chunk a filesystem directory with parallel writers
//! - [`export_directory`] -- write a tree back out with bounded concurrency
//! - [`export_archive`] / [`import_archive`] -- zip archives
//!
//! # Design Rules
//!
//! 1. A name denotes either a file or a directory within one parent, never both.
//! 2. Validation precedes mutation: a rejected operation leaves the tree unchanged.
//! 3. Collapsed directories are expanded lazily, only along the paths touched.

pub mod archive;
pub mod directory;
pub mod entry;
pub mod error;
pub mod export;
pub mod import;

pub use archive::{export_archive, import_archive};
pub use directory::{
    decode_directory, split_path, DirectoryEntry, DirectoryNode, DirectoryState, DirectoryTree,
    Listing, TreeListing,
};
pub use entry::{FileEntry, FileFlags};
pub use error::{DirError, DirResult};
pub use export::{export_directory, ExportStats, DEFAULT_EXPORT_CONCURRENCY};
pub use import::{import_directory, ImportOptions, ImportStats, DEFAULT_IMPORT_WRITERS};
