//! Chunked Merkle trees for Cairn.
//!
//! A byte stream is cut into leaves by a rolling hash; leaves are grouped
//! under interior nodes, which are themselves grouped by a rolling hash over
//! their children's hashes, up to a single root. Every node is immutable and
//! identified by the BLAKE3 hash of its encoded form, so identical data is
//! stored once no matter how many trees reference it.
//!
//! # Writing
//!
//! [`ChunkedDataWriter`] builds a tree from appended bytes and hands finished
//! nodes to a [`TreeWriter`], which deduplicates and flushes them to a
//! [`cairn_store::BlobStore`] in batches.
//!
//! # Reading
//!
//! [`TreeReader`] resolves handles through a shared, single-flight
//! [`NodeCache`] and streams leaves back in order with a [`LeafWalker`].

pub mod builder;
pub mod cache;
pub mod codec;
pub mod error;
pub mod handle;
pub mod node;
pub mod reader;
pub mod writer;

pub use builder::{
    write_bytes, write_stream, ChunkedDataWriter, InteriorNodeBuilder, LeafNodeBuilder,
};
pub use cache::NodeCache;
pub use codec::{decode_node, encode_node, encode_varint, ByteReader, FORMAT_VERSION};
pub use error::{TreeError, TreeResult};
pub use handle::NodeHandle;
pub use node::{InteriorNode, LeafNode, Node, NodeKind, RawDirectory};
pub use reader::{LeafWalker, TreeReader};
pub use writer::{FlushStats, TreeWriter, DEFAULT_BATCH_LIMIT};
