//! Incremental construction of chunked trees.
//!
//! Data flows through [`LeafNodeBuilder`], which cuts it into leaves, and
//! the resulting handles flow through one [`InteriorNodeBuilder`] per level.
//! Each interior builder rolls a hash over its children's 32-byte hashes, so
//! interior boundaries are content-defined too and cascade upward.

use cairn_chunk::{RollingChunker, TreeOptions};
use cairn_types::{is_cancelled, CancelSignal};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{TreeError, TreeResult};
use crate::handle::NodeHandle;
use crate::node::Node;
use crate::writer::TreeWriter;

/// Read size for streaming input.
pub const STREAM_BLOCK_SIZE: usize = 64 * 1024;

/// Accumulates bytes and cuts them into leaf nodes.
pub struct LeafNodeBuilder {
    chunker: RollingChunker,
    buffer: Vec<u8>,
    state: u32,
}

impl LeafNodeBuilder {
    pub fn new(chunker: RollingChunker) -> Self {
        Self {
            chunker,
            buffer: Vec::new(),
            state: 0,
        }
    }

    /// Consume as much of `data` as fits in the current leaf. Returns the
    /// number of bytes taken and whether the leaf is now complete.
    pub fn append(&mut self, data: &[u8]) -> (usize, bool) {
        let scan = self.chunker.scan(&self.buffer, self.state, data);
        self.buffer.extend_from_slice(&data[..scan.consumed]);
        self.state = scan.state;
        (scan.consumed, scan.boundary)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Write the buffered bytes as a leaf, even if short, and reset.
    pub fn finish(&mut self, writer: &mut TreeWriter) -> NodeHandle {
        let data = std::mem::take(&mut self.buffer);
        self.state = 0;
        writer.write_node(&Node::leaf(data))
    }
}

/// Collects child handles for one level of interior nodes.
pub struct InteriorNodeBuilder {
    chunker: RollingChunker,
    children: Vec<NodeHandle>,
    records: Vec<u8>,
    state: u32,
}

impl InteriorNodeBuilder {
    pub fn new(chunker: RollingChunker) -> Self {
        Self {
            chunker,
            children: Vec::new(),
            records: Vec::new(),
            state: 0,
        }
    }

    /// Add a child. Returns `true` when the node is full and should be
    /// written.
    pub fn push(&mut self, child: NodeHandle) -> bool {
        let record = child.hash.as_bytes();
        let scan = self.chunker.scan(&self.records, self.state, record);
        // Record-mode boundaries fall only on record ends and the effective
        // maximum is a whole number of records, so a record is never split.
        debug_assert_eq!(scan.consumed, record.len());
        self.records.extend_from_slice(record);
        self.children.push(child);
        self.state = scan.state;
        scan.boundary
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Write the collected children as an interior node and reset.
    pub fn finish(&mut self, writer: &mut TreeWriter) -> NodeHandle {
        let children = std::mem::take(&mut self.children);
        self.records.clear();
        self.state = 0;
        writer.write_node(&Node::interior(children))
    }

    fn take_only_child(&mut self) -> Option<NodeHandle> {
        if self.children.len() == 1 {
            self.records.clear();
            self.state = 0;
            self.children.pop()
        } else {
            None
        }
    }
}

/// Builds one chunked tree from a stream of appended bytes.
///
/// Single-owner: drive it from one task and hand it a [`TreeWriter`] on each
/// call. Independent streams use independent builders.
pub struct ChunkedDataWriter {
    options: TreeOptions,
    leaf: LeafNodeBuilder,
    levels: Vec<InteriorNodeBuilder>,
    leaves_written: bool,
    length: u64,
}

impl ChunkedDataWriter {
    /// A builder for one stream. Fails if `options` do not validate.
    pub fn new(options: TreeOptions) -> TreeResult<Self> {
        options.validate()?;
        Ok(Self {
            leaf: LeafNodeBuilder::new(RollingChunker::new(options.leaf)?),
            levels: Vec::new(),
            options,
            leaves_written: false,
            length: 0,
        })
    }

    /// Bytes appended since the last `complete`.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Feed bytes into the tree, writing every node that completes.
    pub fn append(&mut self, writer: &mut TreeWriter, mut data: &[u8]) -> TreeResult<()> {
        self.length += data.len() as u64;
        while !data.is_empty() {
            let (consumed, boundary) = self.leaf.append(data);
            data = &data[consumed..];
            if boundary {
                let handle = self.leaf.finish(writer);
                self.leaves_written = true;
                self.push(writer, 0, handle)?;
            }
        }
        Ok(())
    }

    fn push(&mut self, writer: &mut TreeWriter, level: usize, handle: NodeHandle) -> TreeResult<()> {
        if level == self.levels.len() {
            let chunker = RollingChunker::for_records(self.options.interior)?;
            self.levels.push(InteriorNodeBuilder::new(chunker));
        }
        if self.levels[level].push(handle) {
            let parent = self.levels[level].finish(writer);
            self.push(writer, level + 1, parent)?;
        }
        Ok(())
    }

    /// Finish the tree and return its root. The builder is reset and may be
    /// reused for another stream.
    pub fn complete(&mut self, writer: &mut TreeWriter) -> TreeResult<NodeHandle> {
        if !self.leaf.is_empty() || !self.leaves_written {
            let handle = self.leaf.finish(writer);
            self.push(writer, 0, handle)?;
        }

        let mut level = 0;
        let root = loop {
            let is_top = level + 1 == self.levels.len();
            if is_top {
                if let Some(only) = self.levels[level].take_only_child() {
                    break only;
                }
            }
            if !self.levels[level].is_empty() {
                let parent = self.levels[level].finish(writer);
                self.push(writer, level + 1, parent)?;
            }
            level += 1;
        };

        self.levels.clear();
        self.leaves_written = false;
        self.length = 0;
        Ok(root)
    }
}

/// Chunk an in-memory buffer into a tree and return its root.
pub async fn write_bytes(
    writer: &mut TreeWriter,
    options: &TreeOptions,
    data: &[u8],
) -> TreeResult<NodeHandle> {
    let mut builder = ChunkedDataWriter::new(*options)?;
    for block in data.chunks(STREAM_BLOCK_SIZE) {
        builder.append(writer, block)?;
        writer.flush_if_needed().await?;
    }
    builder.complete(writer)
}

/// Chunk everything `reader` yields into a tree and return its root.
///
/// Checks `cancel` between blocks; a cancelled write leaves only complete,
/// unreferenced nodes behind.
pub async fn write_stream<R>(
    writer: &mut TreeWriter,
    options: &TreeOptions,
    mut reader: R,
    cancel: &CancelSignal,
) -> TreeResult<NodeHandle>
where
    R: AsyncRead + Unpin,
{
    let mut builder = ChunkedDataWriter::new(*options)?;
    let mut block = vec![0u8; STREAM_BLOCK_SIZE];
    loop {
        if is_cancelled(cancel) {
            return Err(TreeError::Cancelled);
        }
        let n = reader.read(&mut block).await?;
        if n == 0 {
            break;
        }
        builder.append(writer, &block[..n])?;
        writer.flush_if_needed().await?;
    }
    builder.complete(writer)
}
