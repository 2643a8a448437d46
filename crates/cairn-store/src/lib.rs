//! Namespaced, content-addressed blob storage for Cairn.
//!
//! A blob store is a flat key-value store: `(namespace, hash) -> bytes`.
//! It never interprets what it holds. Tree nodes, directory nodes and opaque
//! user blobs all end up here as immutable byte strings.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileBlobStore`] -- one file per blob with a 2-level fan-out layout
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written; writing an existing hash is a no-op.
//! 2. `put` verifies that the bytes hash to the key.
//! 3. `get` refreshes the blob's last-access time, which drives eviction.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileBlobStore;
pub use memory::InMemoryBlobStore;
pub use traits::{BlobInfo, BlobStore, PutOutcome};
