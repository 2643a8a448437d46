use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width in bytes of every [`ContentHash`].
pub const HASH_SIZE: usize = 32;

/// BLAKE3 digest of a node's or blob's serialized bytes.
///
/// Two objects with the same `ContentHash` are treated as identical, which is
/// what makes deduplication across trees and namespaces safe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; HASH_SIZE]) -> Self {
        Self(hash)
    }

    /// Build from a slice that must be exactly [`HASH_SIZE`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The all-zero hash. Never produced by hashing real content.
    pub const fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// The raw digest.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse the full hex form produced by [`to_hex`](Self::to_hex).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for ContentHash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identifier of an opaque top-level blob in a namespace.
///
/// Blob ids share the hashing scheme of tree nodes but are addressed
/// independently of the tree format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(ContentHash);

impl BlobId {
    /// Identify a blob by hashing its content.
    pub fn of(data: &[u8]) -> Self {
        Self(ContentHash::of(data))
    }

    pub const fn from_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// The content hash this id wraps.
    pub fn hash(&self) -> &ContentHash {
        &self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0.short_hex())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for BlobId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::from_hex(s).map(Self)
    }
}

impl From<ContentHash> for BlobId {
    fn from(hash: ContentHash) -> Self {
        Self(hash)
    }
}
