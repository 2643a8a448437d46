use std::hash::{Hash, Hasher};

use cairn_types::{ContentHash, Locator};
use serde::{Deserialize, Serialize};

/// Reference to a node: its hash, the number of leaf bytes beneath it, and
/// where it lives once flushed.
///
/// Equality and hashing consider only `hash` and `length`; the locator is
/// an address, not part of the node's identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeHandle {
    pub hash: ContentHash,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
}

impl NodeHandle {
    /// An unlocated handle.
    pub fn new(hash: ContentHash, length: u64) -> Self {
        Self {
            hash,
            length,
            locator: None,
        }
    }

    /// Attach the storage address of a flushed node.
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Whether the node has been flushed and located.
    pub fn is_located(&self) -> bool {
        self.locator.is_some()
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.length == other.length
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
        self.length.hash(state);
    }
}
