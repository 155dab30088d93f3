//! Deterministic string hash
//!
//! Polynomial rolling hash over Unicode scalar values. The result is stable
//! across processes and machines, which the persisted `.table` file relies
//! on: buckets are loaded as-is and never recomputed.
//!
//! `std`'s `DefaultHasher` is seeded per process and must not be used here.

/// Multiplier applied to each character before accumulation
pub const CHAR_PRIME: u32 = 1009;

/// Hash a string to 32 bits.
///
/// `h = (h << 10) + h + c * 1009 (mod 2^32)` for every char `c`.
#[inline]
pub fn string_hash(key: &str) -> u32 {
    key.chars().fold(0u32, |h, c| {
        (h << 10)
            .wrapping_add(h)
            .wrapping_add((c as u32).wrapping_mul(CHAR_PRIME))
    })
}
