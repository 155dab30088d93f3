//! Open-addressing string index
//!
//! Maps a token to its ordinal in the key table. Buckets hold `1 + ordinal`
//! (0 marks an empty slot) in an array of exactly `2 * len` slots, built once
//! and never resized.
//!
//! # Probing
//!
//! ```text
//! bucket(attempt) = (string_hash(key) + 7 * attempt) mod capacity
//! ```
//!
//! Build and lookup walk the same sequence, so an empty slot during lookup
//! proves absence. Bucket assignment depends only on the hash and the
//! insertion order, which makes the persisted `.table` byte-for-byte
//! reproducible.
//!
//! When the same key is inserted twice, the first occurrence sits earlier
//! in the shared probe sequence and always wins on lookup.
//!
//! When the capacity is a multiple of 7 (key counts that are multiples of
//! 7), a key's sequence only visits `capacity / 7` buckets: those congruent
//! to its hash mod 7. Building fails with [`IndexError::ProbeExhausted`] if
//! more than that many keys share a residue.

use std::borrow::Cow;

use thiserror::Error;

use crate::buffer::Storage;
use crate::hash::string_hash;
use crate::keys::KeyTable;

/// Bucket value marking an empty slot
pub const EMPTY_BUCKET: i64 = 0;

/// Linear probe stride
pub const PROBE_STEP: u64 = 7;

/// Buckets per key (load factor 0.5)
pub const BUCKETS_PER_KEY: usize = 2;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Key not found: {0:?}")]
    KeyNotFound(String),

    #[error("No free bucket for key {key:?} after {attempts} probes")]
    ProbeExhausted { key: String, attempts: usize },

    #[error("Corrupt bucket table: {0}")]
    CorruptBuckets(String),
}

#[inline(always)]
fn probe(hash: u32, attempt: usize, capacity: usize) -> usize {
    ((hash as u64 + PROBE_STEP * attempt as u64) % capacity as u64) as usize
}

/// Distinct buckets a key's sequence visits in a table of `capacity` slots
pub fn reachable_buckets(capacity: usize) -> usize {
    if capacity % PROBE_STEP as usize == 0 {
        capacity / PROBE_STEP as usize
    } else {
        capacity
    }
}

/// Hash index over a [`KeyTable`]
#[derive(Debug, Clone)]
pub struct StringIndex {
    keys: KeyTable,
    buckets: Storage<i64>,
}

impl StringIndex {
    /// Build the bucket table for `keys`, in order.
    pub fn build(keys: Vec<String>) -> Result<Self, IndexError> {
        let capacity = keys.len() * BUCKETS_PER_KEY;
        let mut buckets = vec![EMPTY_BUCKET; capacity];

        for (i, key) in keys.iter().enumerate() {
            let hash = string_hash(key);
            let slot = (0..capacity)
                .map(|attempt| probe(hash, attempt, capacity))
                .find(|&bucket| buckets[bucket] == EMPTY_BUCKET)
                .ok_or_else(|| IndexError::ProbeExhausted {
                    key: key.clone(),
                    attempts: capacity,
                })?;
            buckets[slot] = 1 + i as i64;
        }

        Ok(Self {
            keys: KeyTable::Owned(keys),
            buckets: Storage::Owned(buckets),
        })
    }

    /// Reassemble from persisted parts without re-hashing.
    ///
    /// Only the shape is validated: `2 * len` buckets, each empty or a valid
    /// 1-based ordinal.
    pub fn from_parts(keys: KeyTable, buckets: Storage<i64>) -> Result<Self, IndexError> {
        let expected = keys.len() * BUCKETS_PER_KEY;
        if buckets.len() != expected {
            return Err(IndexError::CorruptBuckets(format!(
                "expected {} buckets for {} keys, found {}",
                expected,
                keys.len(),
                buckets.len()
            )));
        }

        let max = keys.len() as i64;
        if let Some((slot, value)) = buckets
            .iter()
            .enumerate()
            .find(|&(_, &v)| v != EMPTY_BUCKET && !(1..=max).contains(&v))
        {
            return Err(IndexError::CorruptBuckets(format!(
                "bucket {} holds {} (valid range 1..={})",
                slot, value, max
            )));
        }

        Ok(Self { keys, buckets })
    }

    /// Ordinal of `key`, if present
    #[inline]
    pub fn find(&self, key: &str) -> Option<usize> {
        self.find_with_probes(key).0
    }

    /// Ordinal of `key` plus the number of buckets inspected
    pub fn find_with_probes(&self, key: &str) -> (Option<usize>, usize) {
        let capacity = self.buckets.len();
        if capacity == 0 {
            return (None, 0);
        }

        let hash = string_hash(key);
        for attempt in 0..capacity {
            let value = self.buckets[probe(hash, attempt, capacity)];
            if value == EMPTY_BUCKET {
                return (None, attempt + 1);
            }
            let ordinal = (value - 1) as usize;
            if self.keys.matches(ordinal, key) {
                return (Some(ordinal), attempt + 1);
            }
        }
        (None, capacity)
    }

    /// Strict lookup: absence is an error
    pub fn get(&self, key: &str) -> Result<usize, IndexError> {
        self.find(key)
            .ok_or_else(|| IndexError::KeyNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of buckets (`2 * len`)
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }

    /// Key stored at `ordinal`
    pub fn key(&self, ordinal: usize) -> Option<Cow<'_, str>> {
        self.keys.get(ordinal)
    }

    /// Keys in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = Cow<'_, str>> + '_ {
        self.keys.iter()
    }

    pub fn buckets(&self) -> &[i64] {
        &self.buckets
    }

    pub fn is_mapped(&self) -> bool {
        self.buckets.is_mapped()
    }

    /// Longest probe sequence any stored key needs
    pub fn max_probe_length(&self) -> usize {
        self.keys
            .iter()
            .map(|key| self.find_with_probes(&key).1)
            .max()
            .unwrap_or(0)
    }
}

impl PartialEq for StringIndex {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for StringIndex {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PackedKeys;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_and_find() {
        let index = StringIndex::build(keys(&["the", "of", "and", "to", "in"])).unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(index.capacity(), 10);
        assert_eq!(index.find("the"), Some(0));
        assert_eq!(index.find("in"), Some(4));
        assert_eq!(index.find("a"), None);
        assert!(index.contains("and"));
        assert!(!index.contains("And"));
        assert_eq!(index.key(1).as_deref(), Some("of"));
        assert_eq!(index.key(5), None);
        assert_eq!(index.iter().collect::<Vec<_>>(), ["the", "of", "and", "to", "in"]);
    }

    #[test]
    fn test_every_ordinal_in_exactly_one_bucket() {
        let words: Vec<String> = (0..500).map(|i| format!("w{}", i)).collect();
        let index = StringIndex::build(words).unwrap();

        let mut seen = vec![0usize; index.len()];
        for &b in index.buckets() {
            if b != EMPTY_BUCKET {
                seen[(b - 1) as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
        assert_eq!(
            index.buckets().iter().filter(|&&b| b == EMPTY_BUCKET).count(),
            index.len()
        );
    }

    #[test]
    fn test_collisions_follow_step_of_seven() {
        // "" hashes to 0; with capacity 4 the second copy probes 7 % 4 = 3
        let index = StringIndex::build(keys(&["", ""])).unwrap();
        assert_eq!(index.buckets(), &[1, 0, 0, 2]);
    }

    #[test]
    fn test_seven_keys_sharing_a_residue_exhaust() {
        // w1, w8 and w15 all hash to 0 mod 7; capacity 14 leaves two slots per residue
        let result = StringIndex::build(keys(&["w0", "w1", "w2", "w3", "w4", "w8", "w15"]));
        assert!(matches!(
            result,
            Err(IndexError::ProbeExhausted { key, attempts: 14 }) if key == "w15"
        ));
    }

    #[test]
    fn test_seven_keys_with_spread_residues_build() {
        let words = keys(&["w0", "w1", "w2", "w3", "w4", "w5", "w6"]);
        let index = StringIndex::build(words.clone()).unwrap();
        assert_eq!(index.capacity(), 14);
        for (i, w) in words.iter().enumerate() {
            assert_eq!(index.find(w), Some(i));
        }
    }

    #[test]
    fn test_reachable_buckets() {
        assert_eq!(reachable_buckets(14), 2);
        assert_eq!(reachable_buckets(4046), 578);
        assert_eq!(reachable_buckets(10), 10);
        assert_eq!(reachable_buckets(0), 0);
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let index = StringIndex::build(keys(&["dup", "x", "dup"])).unwrap();
        assert_eq!(index.find("dup"), Some(0));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_strict_get() {
        let index = StringIndex::build(keys(&["a"])).unwrap();
        assert_eq!(index.get("a").unwrap(), 0);
        assert!(matches!(index.get("b"), Err(IndexError::KeyNotFound(k)) if k == "b"));
    }

    #[test]
    fn test_empty_index() {
        let index = StringIndex::build(Vec::new()).unwrap();
        assert_eq!(index.capacity(), 0);
        assert_eq!(index.find("anything"), None);
        assert_eq!(index.max_probe_length(), 0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let words = keys(&["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]);
        let a = StringIndex::build(words.clone()).unwrap();
        let b = StringIndex::build(words).unwrap();
        assert_eq!(a.buckets(), b.buckets());
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_parts_matches_build() {
        let words = keys(&["red", "green", "blue"]);
        let built = StringIndex::build(words.clone()).unwrap();

        let packed = KeyTable::Packed(PackedKeys::pack(&words));
        let rebuilt =
            StringIndex::from_parts(packed, Storage::Owned(built.buckets().to_vec())).unwrap();

        for (i, w) in words.iter().enumerate() {
            assert_eq!(rebuilt.find(w), Some(i));
        }
        assert_eq!(built, rebuilt);
    }

    #[test]
    fn test_from_parts_rejects_bad_shape() {
        let packed = KeyTable::Packed(PackedKeys::pack(&["a", "b"]));
        let result = StringIndex::from_parts(packed, Storage::Owned(vec![0, 1, 2]));
        assert!(matches!(result, Err(IndexError::CorruptBuckets(_))));

        let packed = KeyTable::Packed(PackedKeys::pack(&["a", "b"]));
        let result = StringIndex::from_parts(packed, Storage::Owned(vec![0, 1, 3, 0]));
        assert!(matches!(result, Err(IndexError::CorruptBuckets(_))));
    }

    #[test]
    fn test_probe_length_bounded_by_capacity() {
        let words: Vec<String> = (0..1000).map(|i| format!("token_{}", i)).collect();
        let index = StringIndex::build(words).unwrap();
        assert!(index.max_probe_length() <= index.capacity());
        assert!(index.max_probe_length() >= 1);
    }
}
