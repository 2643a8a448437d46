//! High-level SDK for Cairn.
//!
//! [`StorageClient`] binds a blob store and a namespace together and exposes
//! blob, chunked-file, directory-tree and garbage-collection operations as
//! plain async calls. This is the main entry point for applications
//! embedding Cairn.

pub mod client;
pub mod config;
pub mod error;

pub use client::StorageClient;
pub use config::{CacheConfig, ExportConfig, ImportConfig, StorageConfig, DEFAULT_NAMESPACE};
pub use error::{SdkError, SdkResult};

// Re-export key types
pub use cairn_dir::{DirectoryTree, ExportStats, FileEntry, FileFlags, ImportStats, Listing, TreeListing};
pub use cairn_gc::{GcConfig, GcReport};
pub use cairn_tree::NodeHandle;
pub use cairn_types::{cancel_pair, never_cancel, BlobId, CancelHandle, CancelSignal, ContentHash, NamespaceId};
