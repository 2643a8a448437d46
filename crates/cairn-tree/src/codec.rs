//! Node wire format, version 1.
//!
//! ```text
//! type u8 | version u8 | payload_len varint | payload
//!         | child_count varint | (hash[32] length varint) * child_count
//! ```
//!
//! Leaf payloads are the raw data and carry no children. Interior payloads
//! are the concatenated child hashes, which must agree with the child list.
//! Directory payloads are interpreted by `cairn-dir`.
//!
//! A node's hash is the BLAKE3 digest of its encoded bytes.

use bytes::Bytes;
use cairn_types::{ContentHash, HASH_SIZE};

use crate::error::{TreeError, TreeResult};
use crate::handle::NodeHandle;
use crate::node::{InteriorNode, LeafNode, Node, NodeKind, RawDirectory};

pub const FORMAT_VERSION: u8 = 1;

/// Encode a u64 as a variable-length integer.
pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Bounds-checked reader over an encoded buffer. Errors are plain reasons;
/// callers attach the node hash.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, String> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| format!("truncated at offset {}", self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read an unsigned LEB128 varint of at most ten bytes.
    pub fn read_varint(&mut self) -> Result<u64, String> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            if shift >= 64 {
                return Err("varint overflow".into());
            }
        }
    }

    /// A varint used as an in-memory length or count.
    pub fn read_len(&mut self) -> Result<usize, String> {
        let value = self.read_varint()?;
        usize::try_from(value).map_err(|_| format!("length {value} out of range"))
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], String> {
        if len > self.remaining() {
            return Err(format!(
                "truncated: need {len} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_hash(&mut self) -> Result<ContentHash, String> {
        let bytes = self.read_bytes(HASH_SIZE)?;
        ContentHash::from_slice(bytes).map_err(|e| e.to_string())
    }
}

/// Serialize a node.
pub fn encode_node(node: &Node) -> Vec<u8> {
    let children = node.children();
    let mut buf = Vec::new();
    buf.push(node.kind().type_byte());
    buf.push(FORMAT_VERSION);

    match node {
        Node::Leaf(leaf) => {
            encode_varint(&mut buf, leaf.data.len() as u64);
            buf.extend_from_slice(&leaf.data);
        }
        Node::Interior(interior) => {
            encode_varint(&mut buf, (interior.children.len() * HASH_SIZE) as u64);
            for child in &interior.children {
                buf.extend_from_slice(child.hash.as_bytes());
            }
        }
        Node::Directory(dir) => {
            encode_varint(&mut buf, dir.payload.len() as u64);
            buf.extend_from_slice(&dir.payload);
        }
    }

    encode_varint(&mut buf, children.len() as u64);
    for child in children {
        buf.extend_from_slice(child.hash.as_bytes());
        encode_varint(&mut buf, child.length);
    }
    buf
}

/// Decode and verify a node that was stored under `expected`.
pub fn decode_node(expected: &ContentHash, data: Bytes) -> TreeResult<Node> {
    let computed = ContentHash::of(&data);
    if computed != *expected {
        return Err(TreeError::malformed(
            *expected,
            format!("content hashes to {}", computed.short_hex()),
        ));
    }
    decode_unverified(&data).map_err(|reason| TreeError::malformed(*expected, reason))
}

fn decode_unverified(data: &Bytes) -> Result<Node, String> {
    let mut reader = ByteReader::new(data);

    let type_byte = reader.read_u8()?;
    let kind =
        NodeKind::from_type_byte(type_byte).ok_or_else(|| format!("unknown node type {type_byte}"))?;
    let version = reader.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported node version {version}"));
    }

    let payload_len = reader.read_len()?;
    let payload_start = reader.position();
    reader.read_bytes(payload_len)?;
    let payload = data.slice(payload_start..payload_start + payload_len);

    let child_count = reader.read_len()?;
    // Each child needs at least 33 bytes; reject absurd counts before allocating.
    if child_count > reader.remaining() / (HASH_SIZE + 1) {
        return Err(format!("child count {child_count} exceeds remaining bytes"));
    }
    let mut children = Vec::with_capacity(child_count);
    let mut covered = 0u64;
    for i in 0..child_count {
        let hash = reader.read_hash()?;
        let length = reader.read_varint()?;
        covered = covered
            .checked_add(length)
            .ok_or_else(|| format!("child lengths overflow at child {i}"))?;
        children.push(NodeHandle::new(hash, length));
    }

    if reader.remaining() != 0 {
        return Err(format!("{} trailing bytes", reader.remaining()));
    }

    match kind {
        NodeKind::Leaf => {
            if !children.is_empty() {
                return Err("leaf node has children".into());
            }
            Ok(Node::Leaf(LeafNode { data: payload }))
        }
        NodeKind::Interior => {
            if children.is_empty() {
                return Err("interior node has no children".into());
            }
            if payload.len() != children.len() * HASH_SIZE {
                return Err(format!(
                    "interior payload of {} bytes for {} children",
                    payload.len(),
                    children.len()
                ));
            }
            for (i, (record, child)) in payload.chunks(HASH_SIZE).zip(&children).enumerate() {
                if record != child.hash.as_bytes() {
                    return Err(format!("interior payload disagrees with child {i}"));
                }
            }
            Ok(Node::Interior(InteriorNode { children }))
        }
        NodeKind::Directory => Ok(Node::Directory(RawDirectory { payload, children })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(node: &Node) -> (ContentHash, Bytes) {
        let bytes = encode_node(node);
        (ContentHash::of(&bytes), Bytes::from(bytes))
    }

    fn malformed_reason(bytes: Vec<u8>) -> String {
        let hash = ContentHash::of(&bytes);
        match decode_node(&hash, Bytes::from(bytes)) {
            Err(TreeError::MalformedNode { reason, .. }) => reason,
            other => panic!("expected malformed node, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Varints
    // -----------------------------------------------------------------------

    #[test]
    fn varint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 1_000_000, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            let mut reader = ByteReader::new(&buf);
            assert_eq!(reader.read_varint().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn varint_truncated() {
        assert!(ByteReader::new(&[0x80]).read_varint().is_err());
    }

    #[test]
    fn varint_overflow() {
        assert!(ByteReader::new(&[0xFF; 11]).read_varint().is_err());
    }

    // -----------------------------------------------------------------------
    // Node encoding
    // -----------------------------------------------------------------------

    #[test]
    fn leaf_layout() {
        let bytes = encode_node(&Node::leaf(&b"hi"[..]));
        assert_eq!(bytes, vec![1, FORMAT_VERSION, 2, b'h', b'i', 0]);
    }

    #[test]
    fn decode_leaf_and_interior() {
        let leaf = Node::leaf(&b"leaf data"[..]);
        let (leaf_hash, leaf_bytes) = encoded(&leaf);
        assert_eq!(decode_node(&leaf_hash, leaf_bytes).unwrap(), leaf);

        let interior = Node::interior(vec![
            NodeHandle::new(leaf_hash, 9),
            NodeHandle::new(ContentHash::of(b"other"), 300),
        ]);
        let (hash, bytes) = encoded(&interior);
        let decoded = decode_node(&hash, bytes).unwrap();
        assert_eq!(decoded, interior);
        assert_eq!(decoded.length(), 309);
    }

    #[test]
    fn decode_directory_keeps_payload() {
        let node = Node::directory(
            &b"opaque"[..],
            vec![NodeHandle::new(ContentHash::of(b"f"), 7)],
        );
        let (hash, bytes) = encoded(&node);
        assert_eq!(decode_node(&hash, bytes).unwrap(), node);
    }

    #[test]
    fn empty_leaf_is_valid() {
        let (hash, bytes) = encoded(&Node::leaf(Bytes::new()));
        assert_eq!(decode_node(&hash, bytes).unwrap().length(), 0);
    }

    // -----------------------------------------------------------------------
    // Malformed input
    // -----------------------------------------------------------------------

    #[test]
    fn rejects_hash_mismatch() {
        let (_, bytes) = encoded(&Node::leaf(&b"x"[..]));
        let err = decode_node(&ContentHash::of(b"wrong"), bytes).unwrap_err();
        assert!(matches!(err, TreeError::MalformedNode { .. }));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(malformed_reason(vec![9, FORMAT_VERSION, 0, 0]).contains("unknown node type"));
    }

    #[test]
    fn rejects_unsupported_version() {
        assert!(malformed_reason(vec![1, 2, 0, 0]).contains("unsupported node version"));
    }

    #[test]
    fn rejects_truncation() {
        let mut bytes = encode_node(&Node::leaf(&b"truncate me"[..]));
        bytes.truncate(6);
        assert!(malformed_reason(bytes).contains("truncated"));
        assert!(malformed_reason(Vec::new()).contains("truncated"));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode_node(&Node::leaf(&b"x"[..]));
        bytes.push(0);
        assert!(malformed_reason(bytes).contains("trailing"));
    }

    #[test]
    fn rejects_interior_payload_mismatch() {
        let interior = Node::interior(vec![NodeHandle::new(ContentHash::of(b"a"), 1)]);
        let mut bytes = encode_node(&interior);
        // First payload byte sits after type, version and the 1-byte length.
        bytes[3] ^= 0xFF;
        assert!(malformed_reason(bytes).contains("disagrees"));
    }

    #[test]
    fn rejects_leaf_with_children() {
        let mut bytes = vec![1, FORMAT_VERSION, 0, 1];
        bytes.extend_from_slice(ContentHash::of(b"c").as_bytes());
        bytes.push(1);
        assert!(malformed_reason(bytes).contains("leaf node has children"));
    }

    #[test]
    fn rejects_overflowing_child_lengths() {
        let children = vec![
            NodeHandle::new(ContentHash::of(b"big"), u64::MAX),
            NodeHandle::new(ContentHash::of(b"two"), 2),
        ];
        let interior = encode_node(&Node::interior(children.clone()));
        assert!(malformed_reason(interior).contains("overflow"));
        let directory = encode_node(&Node::directory(&b"dir"[..], children));
        assert!(malformed_reason(directory).contains("overflow"));
    }

    #[test]
    fn rejects_childless_interior() {
        assert!(malformed_reason(vec![2, FORMAT_VERSION, 0, 0]).contains("no children"));
    }
}
