//! Integration tests for the [`Block`] filter against its public API.

use taffy_filter::{Block, Filter};

fn hash_of(i: u64) -> u64 {
    i.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1)
}

#[test]
fn no_false_negatives_over_many_inserts() {
    let mut b = Block::create_with_ndv_fpp(20_000, 0.01).unwrap();
    let hashes: Vec<u64> = (0..20_000).map(hash_of).collect();
    for &h in &hashes {
        b.insert_hash(h).unwrap();
    }
    for &h in &hashes {
        assert!(b.find_hash(h));
    }
}

#[test]
fn false_positive_rate_is_bounded() {
    let ndv = 20_000u64;
    let target_fpp = 0.01;
    let mut b = Block::create_with_ndv_fpp(ndv, target_fpp).unwrap();
    for i in 0..ndv {
        b.insert_hash(hash_of(i)).unwrap();
    }

    let probes = 200_000u64;
    let false_positives = (ndv..ndv + probes).filter(|&i| b.find_hash(hash_of(i))).count();
    let observed = false_positives as f64 / probes as f64;
    assert!(
        observed < target_fpp * 5.0,
        "observed fpp {observed} far exceeds target {target_fpp}"
    );
}

#[test]
fn persistence_under_load_seeded() {
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let mut b = Block::create_with_bytes(16_000).unwrap();
    let mut inserted = Vec::with_capacity(16_000);
    for _ in 0..16_000 {
        let h = rng.next_u64();
        b.insert_hash(h).unwrap();
        inserted.push(h);
    }
    for &h in &inserted {
        assert!(b.find_hash(h));
    }
}

#[test]
fn clone_equivalence() {
    let mut b = Block::create_with_ndv_fpp(1_000, 0.01).unwrap();
    for i in 0..500u64 {
        b.insert_hash(hash_of(i)).unwrap();
    }
    let clone = b.clone();
    for i in 0..500u64 {
        assert_eq!(b.find_hash(hash_of(i)), clone.find_hash(hash_of(i)));
    }

    let mut mutated = clone.clone();
    mutated.insert_hash(hash_of(999_999)).unwrap();
    assert!(mutated.find_hash(hash_of(999_999)));
    assert!(!clone.find_hash(hash_of(999_999)));
    assert!(!b.find_hash(hash_of(999_999)));
}

#[test]
fn serialize_deserialize_idempotence() {
    let mut b = Block::create_with_ndv_fpp(5_000, 0.02).unwrap();
    for i in 0..2_000u64 {
        b.insert_hash(hash_of(i)).unwrap();
    }
    let bytes = b.serialize();
    let mut restored = Block::create_with_bytes(b.size_in_bytes()).unwrap();
    restored.deserialize_into(&bytes).unwrap();
    assert_eq!(b, restored);
}
