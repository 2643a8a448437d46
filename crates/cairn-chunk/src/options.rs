use serde::{Deserialize, Serialize};

use crate::chunker::HASH_RECORD_SIZE;
use crate::error::{ChunkError, ChunkResult};

/// Fewest child records an interior node must be able to hold.
pub const MIN_INTERIOR_RECORDS: usize = 2;

/// Size parameters for one level of chunking.
///
/// Chunks are never shorter than `min_size` (except the last chunk of a
/// stream) and never longer than `max_size`. `target_size` is the expected
/// average between the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub min_size: usize,
    pub max_size: usize,
    pub target_size: usize,
}

impl ChunkingOptions {
    /// Options with explicit bounds. Call [`validate`](Self::validate) before use.
    pub const fn new(min_size: usize, max_size: usize, target_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            target_size,
        }
    }

    /// Purely length-based chunking: every chunk is exactly `size` bytes.
    pub const fn fixed(size: usize) -> Self {
        Self::new(size, size, size)
    }

    /// Whether all three sizes are equal, selecting length-based chunking.
    pub fn is_fixed(&self) -> bool {
        self.min_size == self.target_size && self.target_size == self.max_size
    }

    /// Check `0 < min_size <= target_size <= max_size`.
    pub fn validate(&self) -> ChunkResult<()> {
        if self.min_size == 0 {
            return Err(ChunkError::InvalidOptions("min_size must be positive".into()));
        }
        if self.min_size > self.target_size {
            return Err(ChunkError::InvalidOptions(format!(
                "min_size {} exceeds target_size {}",
                self.min_size, self.target_size
            )));
        }
        if self.target_size > self.max_size {
            return Err(ChunkError::InvalidOptions(format!(
                "target_size {} exceeds max_size {}",
                self.target_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self::new(32 * 1024, 256 * 1024, 64 * 1024)
    }
}

/// Chunking options for both levels of a chunked tree.
///
/// For interior nodes the sizes are measured in bytes of 32-byte hash
/// records, so the defaults allow between 1024 and 8192 children per node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    pub leaf: ChunkingOptions,
    pub interior: ChunkingOptions,
}

impl TreeOptions {
    /// Validate both levels and the interior record capacity.
    pub fn validate(&self) -> ChunkResult<()> {
        self.leaf.validate()?;
        self.interior.validate()?;
        check_interior_capacity(self.interior.max_size)
    }
}

/// Reject an interior `max_size` that rounds down to fewer than
/// [`MIN_INTERIOR_RECORDS`] whole hash records.
pub(crate) fn check_interior_capacity(max_size: usize) -> ChunkResult<()> {
    let records = max_size / HASH_RECORD_SIZE;
    if records < MIN_INTERIOR_RECORDS {
        return Err(ChunkError::InvalidOptions(format!(
            "interior max_size {max_size} holds {records} hash records, need at least {MIN_INTERIOR_RECORDS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = TreeOptions::default();
        assert_eq!(opts.leaf, ChunkingOptions::new(32 * 1024, 256 * 1024, 64 * 1024));
        assert_eq!(opts.interior, opts.leaf);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_ordering() {
        assert!(ChunkingOptions::new(0, 8, 4).validate().is_err());
        assert!(ChunkingOptions::new(8, 16, 4).validate().is_err());
        assert!(ChunkingOptions::new(4, 8, 16).validate().is_err());
        assert!(ChunkingOptions::new(4, 16, 8).validate().is_ok());
    }

    #[test]
    fn fixed_options() {
        let opts = ChunkingOptions::fixed(4096);
        assert!(opts.is_fixed());
        assert!(opts.validate().is_ok());
        assert!(!ChunkingOptions::default().is_fixed());
    }

    #[test]
    fn deserialize_from_toml() {
        let opts: TreeOptions = toml::from_str(
            r#"
            [leaf]
            min_size = 1024
            max_size = 8192
            target_size = 2048
            "#,
        )
        .unwrap();
        assert_eq!(opts.leaf.target_size, 2048);
        assert_eq!(opts.interior, ChunkingOptions::default());
    }

    #[test]
    fn interior_must_hold_two_records() {
        let mut opts = TreeOptions {
            interior: ChunkingOptions::new(4, 16, 8),
            ..TreeOptions::default()
        };
        assert!(opts.interior.validate().is_ok());
        assert!(matches!(opts.validate(), Err(ChunkError::InvalidOptions(_))));

        opts.interior = ChunkingOptions::new(32, 63, 48);
        assert!(opts.validate().is_err());

        opts.interior = ChunkingOptions::new(32, 64, 48);
        assert!(opts.validate().is_ok());
    }
}
