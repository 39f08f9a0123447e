//! Stable key routing.
//!
//! Shard and offsets-partition assignment must agree across nodes, binaries
//! and restarts, so it cannot use the randomly seeded std hasher.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, b| (hash ^ *b as u64).wrapping_mul(FNV_PRIME))
}

/// Maps `key` onto one of `buckets` slots
pub fn bucket_for(
    key: &str,
    buckets: u32,
) -> u32 {
    (fnv1a(key.as_bytes()) % buckets.max(1) as u64) as u32
}
