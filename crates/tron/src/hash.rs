//! Key hashing for map placement.
//!
//! Map entries are placed by the xxh32 hash (seed 0) of the UTF-8 key
//! bytes; each trie level consumes 4 bits of the hash, low nibbles first.

use xxhash_rust::xxh32::xxh32;

/// Maximum number of hash nibbles consumed by branching (28 bits).
///
/// A branch at this depth or deeper cannot occur in well-formed data;
/// entries whose hashes collide through all 7 nibbles share a sorted leaf.
pub const MAX_DEPTH: u8 = 7;

/// Hash key bytes for trie placement.
#[inline]
#[must_use]
pub fn key_hash(key: &[u8]) -> u32 {
    xxh32(key, 0)
}

/// The hash nibble consumed at the given depth.
#[inline]
#[must_use]
pub fn nibble(hash: u32, depth: u8) -> u32 {
    (hash >> (u32::from(depth) * 4)) & 0xF
}
