//! BuzHash (cyclic polynomial) rolling hash.
//!
//! Each byte maps to a pseudo-random 32-bit word; the hash of a window is
//! the XOR of those words, each rotated by its distance from the end of the
//! window. Adding and removing a byte are both O(1).

/// Byte substitution table, derived from a fixed SplitMix64 sequence.
///
/// Changing the seed changes every chunk boundary ever computed.
pub static TABLE: [u32; 256] = build_table(0x9E37_79B9_7F4A_7C15);

const fn build_table(seed: u64) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut state = seed;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        table[i] = (z >> 32) as u32;
        i += 1;
    }
    table
}

/// Feed one byte into a window that is still filling.
#[inline]
pub fn add(hash: u32, byte: u8) -> u32 {
    hash.rotate_left(1) ^ TABLE[byte as usize]
}

/// Slide a full window of `window_size` bytes forward by one byte.
#[inline]
pub fn roll(hash: u32, outgoing: u8, incoming: u8, window_size: usize) -> u32 {
    let shift = (window_size % 32) as u32;
    hash.rotate_left(1) ^ TABLE[outgoing as usize].rotate_left(shift) ^ TABLE[incoming as usize]
}

/// Hash a complete window from scratch.
pub fn hash_window(window: &[u8]) -> u32 {
    window.iter().fold(0, |h, &b| add(h, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_distinct_entries() {
        let mut sorted = TABLE.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 256);
    }

    #[test]
    fn rolling_matches_fresh_hash() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 31 % 251) as u8).collect();
        for window in [1usize, 4, 31, 32, 33, 48] {
            let mut hash = hash_window(&data[..window]);
            for end in window..data.len() {
                hash = roll(hash, data[end - window], data[end], window);
                assert_eq!(
                    hash,
                    hash_window(&data[end + 1 - window..=end]),
                    "window {window} at {end}"
                );
            }
        }
    }
}
