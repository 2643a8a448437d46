//! Content-defined chunking for Cairn.
//!
//! Splits byte streams into chunks whose boundaries depend only on the bytes
//! of the current chunk, so an edit in one region of a file leaves the
//! chunks of every other region untouched.
//!
//! - [`RollingChunker`] -- BuzHash boundary detection with fixed-size and
//!   record-aligned variants
//! - [`ChunkingOptions`] / [`TreeOptions`] -- size parameters for leaf and
//!   interior levels
//!
//! **Options are part of the stored format.** Changing them changes every
//! boundary and defeats deduplication against data written earlier.

pub mod buzhash;
pub mod chunker;
pub mod error;
pub mod options;

pub use chunker::{RollingChunker, Scan, HASH_RECORD_SIZE};
pub use error::{ChunkError, ChunkResult};
pub use options::{ChunkingOptions, TreeOptions, MIN_INTERIOR_RECORDS};
