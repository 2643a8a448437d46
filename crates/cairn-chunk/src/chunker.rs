//! Boundary detection.
//!
//! The chunker is stateless: callers own the bytes of the chunk being built
//! (`window`) and the rolling hash value (`state`), and ask [`RollingChunker::scan`]
//! how much of the next input fits before a boundary. This lets the same
//! chunker drive leaf data and interior hash records without copying.

use std::ops::Range;

use crate::buzhash;
use crate::error::ChunkResult;
use crate::options::{check_interior_capacity, ChunkingOptions};

/// Size of one child-hash record in interior chunking.
pub const HASH_RECORD_SIZE: usize = 32;

/// Outcome of one [`RollingChunker::scan`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scan {
    /// How many bytes of the new input belong to the current chunk.
    pub consumed: usize,
    /// Whether the current chunk ends after `consumed` bytes.
    pub boundary: bool,
    /// Rolling state to pass to the next call. Reset to zero at a boundary.
    pub state: u32,
}

/// BuzHash content-defined chunker.
#[derive(Clone, Debug)]
pub struct RollingChunker {
    options: ChunkingOptions,
    /// Effective maximum; rounded down to whole records in record mode.
    max_size: usize,
    threshold: u32,
    record_size: usize,
}

impl RollingChunker {
    /// Byte-granular chunker, as used for leaf data.
    pub fn new(options: ChunkingOptions) -> ChunkResult<Self> {
        Self::with_record_size(options, 1)
    }

    /// Chunker for interior levels: boundaries fall only between 32-byte
    /// hash records. `max_size` must leave room for at least two records.
    pub fn for_records(options: ChunkingOptions) -> ChunkResult<Self> {
        check_interior_capacity(options.max_size)?;
        Self::with_record_size(options, HASH_RECORD_SIZE)
    }

    fn with_record_size(options: ChunkingOptions, record_size: usize) -> ChunkResult<Self> {
        options.validate()?;
        let max_size = ((options.max_size / record_size) * record_size).max(record_size);
        let threshold = ((1u64 << 32) / options.target_size as u64).min(u32::MAX as u64) as u32;
        Ok(Self {
            options,
            max_size,
            threshold,
            record_size,
        })
    }

    /// The options this chunker was built from.
    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Largest chunk this chunker will ever produce.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Decide how many bytes of `new` extend the chunk whose bytes so far are
    /// `window`, and whether the chunk ends there.
    ///
    /// `state` must be the value returned by the previous call for the same
    /// chunk, or zero when `window` is empty.
    pub fn scan(&self, window: &[u8], state: u32, new: &[u8]) -> Scan {
        let len = window.len();
        if len >= self.max_size {
            return Scan {
                consumed: 0,
                boundary: true,
                state: 0,
            };
        }
        if self.options.is_fixed() {
            return self.scan_fixed(len, new);
        }

        let span = self.options.min_size;
        let mut hash = state;
        for (i, &byte) in new.iter().enumerate() {
            let pos = len + i;
            hash = if pos < span {
                buzhash::add(hash, byte)
            } else {
                let out = pos - span;
                let outgoing = if out < len { window[out] } else { new[out - len] };
                buzhash::roll(hash, outgoing, byte, span)
            };

            let size = pos + 1;
            if size == self.max_size {
                return Scan {
                    consumed: i + 1,
                    boundary: true,
                    state: 0,
                };
            }
            if size >= span && size % self.record_size == 0 && hash < self.threshold {
                return Scan {
                    consumed: i + 1,
                    boundary: true,
                    state: 0,
                };
            }
        }

        Scan {
            consumed: new.len(),
            boundary: false,
            state: hash,
        }
    }

    fn scan_fixed(&self, len: usize, new: &[u8]) -> Scan {
        let room = self.max_size - len;
        if new.len() >= room {
            Scan {
                consumed: room,
                boundary: true,
                state: 0,
            }
        } else {
            Scan {
                consumed: new.len(),
                boundary: false,
                state: 0,
            }
        }
    }

    /// Split a whole buffer into chunk ranges. The final range may be short.
    pub fn split(&self, data: &[u8]) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        let mut pos = 0;
        let mut state = 0;

        while pos < data.len() {
            let scan = self.scan(&data[start..pos], state, &data[pos..]);
            pos += scan.consumed;
            state = scan.state;
            if scan.boundary {
                ranges.push(start..pos);
                start = pos;
            }
        }
        if start < data.len() {
            ranges.push(start..data.len());
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn lcg_data(size: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..size)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                (state >> 16) as u8
            })
            .collect()
    }

    fn small() -> RollingChunker {
        RollingChunker::new(ChunkingOptions::new(64, 1024, 256)).unwrap()
    }

    // -----------------------------------------------------------------------
    // Bounds
    // -----------------------------------------------------------------------

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(small().split(b"").is_empty());
    }

    #[test]
    fn short_input_is_one_chunk() {
        let data = lcg_data(40, 1);
        assert_eq!(small().split(&data), vec![0..40]);
    }

    #[test]
    fn chunk_sizes_within_bounds() {
        let chunker = small();
        let data = lcg_data(100_000, 7);
        let ranges = chunker.split(&data);
        assert!(ranges.len() > 10);

        for (i, range) in ranges.iter().enumerate() {
            assert!(range.len() <= 1024, "chunk {i} too long: {}", range.len());
            if i < ranges.len() - 1 {
                assert!(range.len() >= 64, "chunk {i} too short: {}", range.len());
            }
        }
    }

    #[test]
    fn ranges_are_contiguous() {
        let data = lcg_data(50_000, 3);
        let ranges = small().split(&data);
        let mut expected = 0;
        for range in &ranges {
            assert_eq!(range.start, expected);
            expected = range.end;
        }
        assert_eq!(expected, data.len());
    }

    #[test]
    fn constant_data_repeats_one_chunk_size() {
        let ranges = small().split(&[0u8; 5000]);
        let first = ranges[0].len();
        assert!((64..=1024).contains(&first));
        for range in &ranges[..ranges.len() - 1] {
            assert_eq!(range.len(), first);
        }
    }

    #[test]
    fn small_pattern_scenario() {
        let chunker = RollingChunker::new(ChunkingOptions::new(4, 16, 8)).unwrap();
        let data: Vec<u8> = b"abc".iter().copied().cycle().take(30).collect();

        let ranges = chunker.split(&data);
        assert!((2..=8).contains(&ranges.len()), "got {} leaves", ranges.len());
        for range in &ranges[..ranges.len() - 1] {
            assert!((4..=16).contains(&range.len()));
        }
        assert_eq!(ranges, chunker.split(&data));
    }

    // -----------------------------------------------------------------------
    // Fixed and record modes
    // -----------------------------------------------------------------------

    #[test]
    fn fixed_mode_is_length_based() {
        let chunker = RollingChunker::new(ChunkingOptions::fixed(100)).unwrap();
        let ranges = chunker.split(&lcg_data(350, 5));
        assert_eq!(ranges, vec![0..100, 100..200, 200..300, 300..350]);
    }

    #[test]
    fn record_mode_cuts_on_record_ends() {
        let chunker = RollingChunker::for_records(ChunkingOptions::new(64, 1000, 128)).unwrap();
        assert_eq!(chunker.max_size(), 992);

        let data = lcg_data(32 * 500, 9);
        for range in chunker.split(&data) {
            assert_eq!(range.start % HASH_RECORD_SIZE, 0);
            assert_eq!(range.end % HASH_RECORD_SIZE, 0);
            assert!(range.len() <= 992);
        }
    }

    #[test]
    fn record_mode_rejects_single_record_nodes() {
        assert!(RollingChunker::for_records(ChunkingOptions::new(4, 16, 8)).is_err());
        assert!(RollingChunker::for_records(ChunkingOptions::new(4, 63, 8)).is_err());

        let chunker = RollingChunker::for_records(ChunkingOptions::new(4, 70, 8)).unwrap();
        assert_eq!(chunker.max_size(), 2 * HASH_RECORD_SIZE);
        let ranges = chunker.split(&lcg_data(32 * 5, 2));
        for range in &ranges[..ranges.len() - 1] {
            assert_eq!(range.len() % HASH_RECORD_SIZE, 0);
            assert!(range.len() <= 2 * HASH_RECORD_SIZE);
        }
    }

    #[test]
    fn rejects_invalid_options() {
        assert!(RollingChunker::new(ChunkingOptions::new(0, 16, 8)).is_err());
    }

    // -----------------------------------------------------------------------
    // Incremental scanning
    // -----------------------------------------------------------------------

    #[test]
    fn full_window_reports_boundary_without_consuming() {
        let chunker = RollingChunker::new(ChunkingOptions::new(4, 16, 8)).unwrap();
        let scan = chunker.scan(&[1u8; 16], 0, b"more");
        assert_eq!(
            scan,
            Scan {
                consumed: 0,
                boundary: true,
                state: 0
            }
        );
    }

    #[test]
    fn piecewise_scan_matches_split() {
        let chunker = small();
        let data = lcg_data(20_000, 11);

        let mut ranges = Vec::new();
        let mut current = Vec::new();
        let mut state = 0;
        let mut offset = 0;
        for block in data.chunks(37) {
            let mut rest = block;
            while !rest.is_empty() {
                let scan = chunker.scan(&current, state, rest);
                current.extend_from_slice(&rest[..scan.consumed]);
                rest = &rest[scan.consumed..];
                state = scan.state;
                if scan.boundary {
                    ranges.push(offset..offset + current.len());
                    offset += current.len();
                    current.clear();
                }
            }
        }
        if !current.is_empty() {
            ranges.push(offset..offset + current.len());
        }
        assert_eq!(ranges, chunker.split(&data));
    }

    proptest! {
        #[test]
        fn prop_split_covers_input(data in proptest::collection::vec(any::<u8>(), 0..8192)) {
            let ranges = small().split(&data);
            let total: usize = ranges.iter().map(Range::len).sum();
            prop_assert_eq!(total, data.len());
            for range in &ranges {
                prop_assert!(range.len() <= 1024);
            }
        }

        #[test]
        fn prop_shared_prefix_gives_shared_chunks(
            prefix in proptest::collection::vec(any::<u8>(), 2048..6000),
            tail_a in proptest::collection::vec(any::<u8>(), 0..512),
            tail_b in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let chunker = small();
            let a = [prefix.as_slice(), tail_a.as_slice()].concat();
            let b = [prefix.as_slice(), tail_b.as_slice()].concat();
            let cutoff = prefix.len() - chunker.max_size();

            let early = |ranges: Vec<Range<usize>>| -> Vec<Range<usize>> {
                ranges.into_iter().filter(|r| r.end <= cutoff).collect()
            };
            prop_assert_eq!(early(chunker.split(&a)), early(chunker.split(&b)));
        }
    }
}
