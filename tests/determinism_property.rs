use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;
use wordvec::core::format::{write_cache_set, CacheContents};
use wordvec::core::index::{IndexError, EMPTY_BUCKET};
use wordvec::core::keys::{KeyTable, PackedKeys};
use wordvec::core::store::CacheSet;
use wordvec::core::Storage;
use wordvec::{string_hash, CachePaths, StringIndex};

const ALPHABET: &[char] = &['a', 'b', 'c', 'é', 'ß', '日', '本', ' ', '-', '0', '\u{1F600}'];

// For multiples of 7 the capacity 2n is too, and each key only visits the
// 2n / 7 buckets in its hash residue class mod 7
const KEY_COUNTS: &[usize] = &[1, 2, 3, 7, 10, 14, 64, 100, 333, 1000, 2023, 2024];

fn random_key(rng: &mut StdRng) -> String {
    let len = rng.gen_range(0..12usize);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

fn random_keys(rng: &mut StdRng, count: usize) -> Vec<String> {
    (0..count).map(|_| random_key(rng)).collect()
}

/// True when some residue class mod 7 holds more keys than it has buckets
fn crowded_residue(keys: &[String]) -> bool {
    let capacity = 2 * keys.len();
    if capacity % 7 != 0 {
        return false;
    }
    let mut per_residue = [0usize; 7];
    for key in keys {
        per_residue[(string_hash(key) % 7) as usize] += 1;
    }
    per_residue.iter().any(|&n| n > capacity / 7)
}

/// Build, asserting that failure happens exactly when a residue is crowded
fn build_checked(keys: Vec<String>) -> Option<StringIndex> {
    let crowded = crowded_residue(&keys);
    match StringIndex::build(keys) {
        Ok(index) => {
            assert!(!crowded, "built {} keys despite a crowded residue", index.len());
            Some(index)
        }
        Err(IndexError::ProbeExhausted { attempts, .. }) => {
            assert!(crowded, "exhausted {} buckets with room left", attempts);
            None
        }
        Err(e) => panic!("unexpected build error: {}", e),
    }
}

#[test]
fn test_rebuild_is_identical() {
    let mut rng = StdRng::seed_from_u64(7);
    for &count in KEY_COUNTS {
        let keys = random_keys(&mut rng, count);
        let Some(a) = build_checked(keys.clone()) else {
            assert!(StringIndex::build(keys).is_err(), "count {}", count);
            continue;
        };
        let b = StringIndex::build(keys).expect("build");
        assert_eq!(a.buckets(), b.buckets(), "count {}", count);
        assert_eq!(a, b);
    }
}

#[test]
fn test_no_false_negatives_and_first_wins() {
    let mut rng = StdRng::seed_from_u64(42);
    for &count in KEY_COUNTS {
        let keys = random_keys(&mut rng, count);
        let Some(index) = build_checked(keys.clone()) else {
            continue;
        };
        assert_eq!(index.capacity(), 2 * count);

        let mut first: HashMap<&str, usize> = HashMap::new();
        for (i, key) in keys.iter().enumerate() {
            first.entry(key.as_str()).or_insert(i);
        }
        for (key, &ordinal) in &first {
            let (found, steps) = index.find_with_probes(key);
            assert_eq!(found, Some(ordinal), "key {:?}", key);
            assert!(steps <= index.capacity());
        }

        for _ in 0..200 {
            let absent = format!("{}#absent", random_key(&mut rng));
            assert_eq!(index.find(&absent), None);
        }
    }
}

#[test]
fn test_every_ordinal_stored_once() {
    let mut rng = StdRng::seed_from_u64(1234);
    let keys = random_keys(&mut rng, 1000);
    let index = StringIndex::build(keys).expect("build");

    let mut counts = vec![0usize; index.len()];
    for &bucket in index.buckets() {
        if bucket != EMPTY_BUCKET {
            counts[(bucket - 1) as usize] += 1;
        }
    }
    assert!(counts.iter().all(|&c| c == 1));
}

#[test]
fn test_spread_residues_build_for_multiples_of_seven() {
    for count in [7, 14, 21, 700, 2023] {
        let limit = 2 * count / 7;
        let mut per_residue = [0usize; 7];
        let keys: Vec<String> = (0..)
            .map(|i| format!("k{}", i))
            .filter(|key| {
                let residue = (string_hash(key) % 7) as usize;
                per_residue[residue] += 1;
                per_residue[residue] <= limit
            })
            .take(count)
            .collect();
        assert!(!crowded_residue(&keys));

        let index = StringIndex::build(keys.clone()).expect("build");
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(index.find(key), Some(i), "count {}", count);
        }
        assert!(index.max_probe_length() <= limit);
    }
}

#[test]
fn test_crowded_residue_fails_deterministically() {
    let mut rng = StdRng::seed_from_u64(77);
    for _ in 0..50 {
        // All 7 keys share one residue, which has only 2 of the 14 buckets
        let base = random_key(&mut rng);
        let residue = string_hash(&base) % 7;
        let keys: Vec<String> = (0..)
            .map(|i| format!("{}{}", base, i))
            .filter(|key| string_hash(key) % 7 == residue)
            .take(7)
            .collect();
        assert!(crowded_residue(&keys));
        assert!(build_checked(keys.clone()).is_none());
        assert!(StringIndex::build(keys).is_err());
    }
}

#[test]
fn test_first_probe_is_hash_mod_capacity() {
    let keys: Vec<String> = ["alpha", "beta", "gamma"].iter().map(|s| s.to_string()).collect();
    let index = StringIndex::build(keys).expect("build");
    let slot = (string_hash("alpha") as usize) % index.capacity();
    assert_eq!(index.buckets()[slot], 1);
}

#[test]
fn test_mapped_index_agrees_with_owned() {
    let dir = tempdir().expect("tempdir");
    let mut rng = StdRng::seed_from_u64(99);
    let keys = random_keys(&mut rng, 500);
    let dim = 4;
    let vectors: Vec<f32> = (0..keys.len() * dim).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let owned = StringIndex::build(keys.clone()).expect("build");
    let packed = PackedKeys::pack(&keys);
    let paths = CachePaths::for_source(std::path::Path::new("random.txt"), dir.path());
    write_cache_set(
        &paths,
        &CacheContents {
            vectors: &vectors,
            dim,
            keys: &packed,
            buckets: owned.buckets(),
        },
    )
    .expect("write");

    let set = CacheSet::open(&paths).expect("open");
    let mapped =
        StringIndex::from_parts(KeyTable::Packed(set.keys), Storage::Mapped(set.buckets)).expect("parts");
    assert!(mapped.is_mapped());
    assert_eq!(mapped, owned);

    for key in &keys {
        assert_eq!(mapped.find(key), owned.find(key));
    }
    for _ in 0..100 {
        let key = random_key(&mut rng);
        assert_eq!(mapped.find(&key), owned.find(&key));
    }
}
