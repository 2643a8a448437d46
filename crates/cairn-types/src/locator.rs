use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::namespace::NamespaceId;

/// Opaque storage address of a flushed node.
///
/// Callers must not parse a locator; the only guarantee is that the store
/// which issued it can resolve it again.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    /// Locator for an object stored under `hash` in `namespace`.
    pub fn new(namespace: &NamespaceId, hash: &ContentHash) -> Self {
        Self(format!("{namespace}/{hash}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
