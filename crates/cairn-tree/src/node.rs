use bytes::Bytes;
use cairn_types::ContentHash;

use crate::handle::NodeHandle;

/// Wire type tag of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Leaf,
    Interior,
    Directory,
}

impl NodeKind {
    /// Tag written as the first byte of an encoded node.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Leaf => 1,
            Self::Interior => 2,
            Self::Directory => 3,
        }
    }

    /// Inverse of [`type_byte`](Self::type_byte). `None` for unknown tags.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Leaf),
            2 => Some(Self::Interior),
            3 => Some(Self::Directory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Interior => "interior",
            Self::Directory => "directory",
        }
    }
}

/// A chunk of raw file data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafNode {
    pub data: Bytes,
}

/// An ordered list of child nodes whose leaves, concatenated, form the
/// covered byte range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteriorNode {
    pub children: Vec<NodeHandle>,
}

/// A directory node as seen by the tree layer: an opaque payload plus the
/// handles it references. `cairn-dir` gives the payload its meaning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDirectory {
    pub payload: Bytes,
    pub children: Vec<NodeHandle>,
}

/// An immutable, decoded node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Interior(InteriorNode),
    Directory(RawDirectory),
}

impl Node {
    /// A leaf holding `data`.
    pub fn leaf(data: impl Into<Bytes>) -> Self {
        Self::Leaf(LeafNode { data: data.into() })
    }

    /// An interior node over `children`, in order.
    pub fn interior(children: Vec<NodeHandle>) -> Self {
        Self::Interior(InteriorNode { children })
    }

    /// A directory node with an encoded entry payload.
    pub fn directory(payload: impl Into<Bytes>, children: Vec<NodeHandle>) -> Self {
        Self::Directory(RawDirectory {
            payload: payload.into(),
            children,
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Leaf(_) => NodeKind::Leaf,
            Self::Interior(_) => NodeKind::Interior,
            Self::Directory(_) => NodeKind::Directory,
        }
    }

    /// Child handles in wire order. Empty for leaves.
    pub fn children(&self) -> &[NodeHandle] {
        match self {
            Self::Leaf(_) => &[],
            Self::Interior(n) => &n.children,
            Self::Directory(n) => &n.children,
        }
    }

    /// Hashes of every node this node references directly.
    pub fn references(&self) -> impl Iterator<Item = ContentHash> + '_ {
        self.children().iter().map(|c| c.hash)
    }

    /// Number of leaf bytes covered by this node.
    ///
    /// Decoding rejects nodes whose child lengths overflow, so this only
    /// saturates for nodes built by hand.
    pub fn length(&self) -> u64 {
        match self {
            Self::Leaf(n) => n.data.len() as u64,
            _ => self
                .children()
                .iter()
                .fold(0u64, |total, c| total.saturating_add(c.length)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_byte_roundtrip() {
        for kind in [NodeKind::Leaf, NodeKind::Interior, NodeKind::Directory] {
            assert_eq!(NodeKind::from_type_byte(kind.type_byte()), Some(kind));
        }
        assert_eq!(NodeKind::from_type_byte(0), None);
        assert_eq!(NodeKind::from_type_byte(4), None);
    }

    #[test]
    fn interior_length_sums_children() {
        let node = Node::interior(vec![
            NodeHandle::new(ContentHash::of(b"a"), 10),
            NodeHandle::new(ContentHash::of(b"b"), 32),
        ]);
        assert_eq!(node.length(), 42);
        assert_eq!(node.references().count(), 2);
    }

    #[test]
    fn leaf_has_no_references() {
        let node = Node::leaf(&b"data"[..]);
        assert_eq!(node.length(), 4);
        assert!(node.children().is_empty());
        assert_eq!(node.kind().as_str(), "leaf");
    }
}
