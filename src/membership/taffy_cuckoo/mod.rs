//! Taffy-Cuckoo: a quotient cuckoo filter that grows by doubling.
//!
//! Two [`Side`]s, each a power-of-two-sized array of 4-slot buckets plus a
//! small overflow stash, share the 15 bits of entropy a key contributes
//! (`kHeadSize` fingerprint bits + `kTailSize` tail bits). Growing doubles
//! `log_side_size` and re-derives every occupied slot's path by stealing one
//! bit from its tail (or, once a tail is fully consumed, re-deriving it as
//! two paths at the new size). See [`frozen`] for the read-only snapshot
//! form.

pub mod frozen;
mod path;

use crate::common::error::{FilterError, Result};
use crate::common::feistel::Feistel;
use crate::common::pcg::PcgRandom;
use crate::common::validation::validate_bytes;
use crate::common::{tail, Filter};

pub use frozen::FrozenTaffyCuckoo;
pub(crate) use path::{from_path_no_tail, to_path, Path, Slot, K_HEAD_SIZE, K_TAIL_SIZE, SLOTS};

const ENTROPY: [u64; 8] = [
    0x2ba7538ee1234073,
    0xfcc3777539b147d6,
    0x6086c563576347e7,
    0x52eff34ee1764465,
    0x8639cbf57f264867,
    0x5a31ee34f0224ccb,
    0x07a1cb8140744ee6,
    0xf2296cf6a6524e9f,
];

const INSERT_TTL: i32 = 32;

#[derive(Clone, Debug)]
pub(crate) struct Side {
    pub(crate) f: Feistel,
    pub(crate) data: Vec<[Slot; SLOTS]>,
    pub(crate) stash: Vec<Path>,
}

impl Side {
    fn new(f: Feistel, log_side_size: u32) -> Self {
        Side {
            f,
            data: vec![[Slot::empty(); SLOTS]; 1usize << log_side_size],
            stash: Vec::new(),
        }
    }

    /// Try to place `p`; returns a path with `tail() == 0` on success, `p`
    /// unchanged if it was already present, or a displaced occupant to
    /// continue the cuckoo walk with otherwise.
    fn insert(&mut self, mut p: Path, rng: &mut PcgRandom) -> Path {
        debug_assert_ne!(p.slot.tail(), 0);
        let bucket = &mut self.data[p.bucket as usize];
        for slot in bucket.iter_mut() {
            if slot.is_empty() {
                *slot = p.slot;
                p.slot = Slot::new(p.slot.fingerprint(), 0);
                return p;
            }
            if slot.fingerprint() == p.slot.fingerprint()
                && tail::is_prefix_of(slot.tail(), p.slot.tail())
            {
                return p;
            }
        }
        let i = (rng.get() as usize) % SLOTS;
        let displaced = bucket[i];
        bucket[i] = p.slot;
        Path {
            slot: displaced,
            bucket: p.bucket,
        }
    }

    fn find(&self, p: Path) -> bool {
        for s in &self.stash {
            if s.bucket == p.bucket
                && s.slot.fingerprint() == p.slot.fingerprint()
                && tail::is_prefix_of(s.slot.tail(), p.slot.tail())
            {
                return true;
            }
        }
        for slot in &self.data[p.bucket as usize] {
            if !slot.is_empty()
                && slot.fingerprint() == p.slot.fingerprint()
                && tail::is_prefix_of(slot.tail(), p.slot.tail())
            {
                return true;
            }
        }
        false
    }
}

/// A Taffy-Cuckoo filter.
#[derive(Clone, Debug)]
pub struct TaffyCuckoo {
    sides: [Side; 2],
    log_side_size: u32,
    rng: PcgRandom,
    entropy: [u64; 8],
    occupied: u64,
}

impl TaffyCuckoo {
    /// Construct a filter sized to use roughly `bytes` bytes of slot storage
    /// (the stash grows independently as needed).
    pub fn create_with_bytes(bytes: u64) -> Result<Self> {
        validate_bytes(bytes)?;
        let slot_bytes = 2.0; // fingerprint+tail packed into 16 bits
        let f = (bytes as f64 / (2.0 * SLOTS as f64 * slot_bytes)).log2();
        let log_side_size = f.max(1.0) as u32;
        Ok(Self::with_log_side_size(log_side_size, ENTROPY))
    }

    fn with_log_side_size(log_side_size: u32, entropy: [u64; 8]) -> Self {
        let f0 = Feistel::new([entropy[0], entropy[1], entropy[2], entropy[3]]);
        let f1 = Feistel::new([entropy[4], entropy[5], entropy[6], entropy[7]]);
        TaffyCuckoo {
            sides: [Side::new(f0, log_side_size), Side::new(f1, log_side_size)],
            log_side_size,
            rng: PcgRandom::new(path::LOG_SLOTS),
            entropy,
            occupied: 0,
        }
    }

    /// Total number of fingerprint slots across both sides.
    pub fn capacity(&self) -> u64 {
        2 * SLOTS as u64 * (1u64 << self.log_side_size)
    }

    fn stash_len(&self) -> usize {
        self.sides[0].stash.len() + self.sides[1].stash.len()
    }

    fn needs_upsize(&self) -> bool {
        let cap = self.capacity();
        self.occupied > (cap * 9) / 10 || self.occupied + 4 >= cap || self.stash_len() > 8
    }

    fn insert_side_path_ttl(&mut self, start_side: usize, mut p: Path, mut ttl: i32) {
        let mut current = start_side;
        loop {
            let q = p;
            p = self.sides[current].insert(p, &mut self.rng);
            if p.slot.tail() == 0 {
                self.occupied += 1;
                return;
            }
            if p == q {
                return;
            }
            let t = p.slot.tail();
            if ttl <= 0 {
                self.sides[current].stash.push(p);
                self.occupied += 1;
                return;
            }
            ttl -= 1;
            let other = 1 - current;
            let raw = from_path_no_tail(p, &self.sides[current].f, self.log_side_size);
            p = to_path(raw, &self.sides[other].f, self.log_side_size);
            p.slot = Slot::new(p.slot.fingerprint(), t);
            current = other;
        }
    }

    fn upsize(&mut self) {
        let new_log_side_size = self.log_side_size + 1;
        let mut grown = TaffyCuckoo::with_log_side_size(new_log_side_size, self.entropy);
        for s in 0..2 {
            let stash = std::mem::take(&mut self.sides[s].stash);
            for p in stash {
                upsize_helper(self.log_side_size, &self.sides[s].f, p.slot, p.bucket, s, &mut grown);
            }
            for (i, bucket) in self.sides[s].data.iter().enumerate() {
                for &slot in bucket {
                    if !slot.is_empty() {
                        upsize_helper(self.log_side_size, &self.sides[s].f, slot, i as u64, s, &mut grown);
                    }
                }
            }
        }
        *self = grown;
    }

    /// Merge `other` into a clone of the larger of `self`/`other`, growing
    /// the result if needed. Neither input is mutated.
    pub fn union(&self, other: &TaffyCuckoo) -> TaffyCuckoo {
        let (mut larger, smaller) = if self.occupied >= other.occupied {
            (self.clone(), other)
        } else {
            (other.clone(), self)
        };
        // union_help assumes smaller.log_side_size <= larger.log_side_size;
        // occupied and log_side_size don't always agree, so grow explicitly.
        while larger.log_side_size < smaller.log_side_size {
            larger.upsize();
        }
        for s in 0..2 {
            for p in &smaller.sides[s].stash {
                union_help(smaller.log_side_size, &smaller.sides[s].f, s, *p, &mut larger);
            }
            for (i, bucket) in smaller.sides[s].data.iter().enumerate() {
                for &slot in bucket {
                    if !slot.is_empty() {
                        let p = Path {
                            slot,
                            bucket: i as u64,
                        };
                        union_help(smaller.log_side_size, &smaller.sides[s].f, s, p, &mut larger);
                    }
                }
            }
        }
        larger
    }

    /// Snapshot this filter into a read-only, fingerprint-only form.
    pub fn freeze(&self) -> FrozenTaffyCuckoo {
        frozen::freeze(self)
    }
}

fn upsize_helper(
    old_log_side_size: u32,
    old_f: &Feistel,
    slot: Slot,
    bucket: u64,
    side: usize,
    grown: &mut TaffyCuckoo,
) {
    let p = Path { slot, bucket };
    let q = from_path_no_tail(p, old_f, old_log_side_size);
    if slot.tail() == tail::empty(K_TAIL_SIZE) {
        let mut p1 = to_path(q, &grown.sides[0].f, grown.log_side_size);
        p1.slot = Slot::new(p1.slot.fingerprint(), slot.tail());
        grown.insert_side_path_ttl(0, p1, INSERT_TTL);

        let extra_bit = 1u64 << (64 - old_log_side_size - K_HEAD_SIZE - 1);
        let mut p2 = to_path(q | extra_bit, &grown.sides[0].f, grown.log_side_size);
        p2.slot = Slot::new(p2.slot.fingerprint(), slot.tail());
        grown.insert_side_path_ttl(0, p2, INSERT_TTL);
    } else {
        let stolen_bit = (slot.tail() >> K_TAIL_SIZE) as u64;
        let q2 = q | (stolen_bit << (64 - old_log_side_size - K_HEAD_SIZE - 1));
        let mut r = to_path(q2, &grown.sides[0].f, grown.log_side_size);
        r.slot = Slot::new(r.slot.fingerprint(), slot.tail() << 1);
        grown.insert_side_path_ttl(0, r, INSERT_TTL);
        let _ = side;
    }
}

fn union_help(
    that_log_side_size: u32,
    that_f: &Feistel,
    _side: usize,
    p: Path,
    here: &mut TaffyCuckoo,
) {
    let mut hashed = from_path_no_tail(p, that_f, that_log_side_size);
    let tail_length = tail::length(p.slot.tail(), K_TAIL_SIZE);

    if that_log_side_size == here.log_side_size {
        let mut q = to_path(hashed, &here.sides[0].f, here.log_side_size);
        q.slot = Slot::new(q.slot.fingerprint(), p.slot.tail());
        here.insert_side_path_ttl(0, q, INSERT_TTL);
    } else if that_log_side_size + tail_length >= here.log_side_size {
        let shift = 64 - that_log_side_size - K_HEAD_SIZE - tail_length;
        let orin = (tail::bits(p.slot.tail()) as u64) << shift;
        hashed |= orin;
        let mut q = to_path(hashed, &here.sides[0].f, here.log_side_size);
        let grown_tail = p.slot.tail() << (here.log_side_size - that_log_side_size);
        q.slot = Slot::new(q.slot.fingerprint(), grown_tail);
        here.insert_side_path_ttl(0, q, INSERT_TTL);
    } else {
        let shift = 64 - that_log_side_size - K_HEAD_SIZE - tail_length;
        let orin = (tail::bits(p.slot.tail()) as u64) << shift;
        hashed |= orin;
        let reps = 1u64 << (here.log_side_size - that_log_side_size - tail_length);
        for i in 0..reps {
            let extra = i << (64 - here.log_side_size - K_HEAD_SIZE);
            let mut q = to_path(hashed | extra, &here.sides[0].f, here.log_side_size);
            q.slot = Slot::new(q.slot.fingerprint(), tail::empty(K_TAIL_SIZE));
            here.insert_side_path_ttl(0, q, INSERT_TTL);
        }
    }
}

impl Filter for TaffyCuckoo {
    fn insert_hash(&mut self, hash: u64) -> Result<()> {
        if self.log_side_size >= 62 {
            return Err(FilterError::CapacityExceeded {
                levels: self.log_side_size as usize,
            });
        }
        while self.needs_upsize() {
            if self.log_side_size >= 62 {
                return Err(FilterError::CapacityExceeded {
                    levels: self.log_side_size as usize,
                });
            }
            self.upsize();
        }
        let p = to_path(hash, &self.sides[0].f, self.log_side_size);
        self.insert_side_path_ttl(0, p, INSERT_TTL);
        Ok(())
    }

    fn find_hash(&self, hash: u64) -> bool {
        let p0 = to_path(hash, &self.sides[0].f, self.log_side_size);
        if self.sides[0].find(p0) {
            return true;
        }
        let p1 = to_path(hash, &self.sides[1].f, self.log_side_size);
        self.sides[1].find(p1)
    }

    fn size_in_bytes(&self) -> u64 {
        let slots_bytes = 2 * SLOTS as u64 * (1u64 << self.log_side_size) * 2;
        let stash_bytes = self.stash_len() as u64 * std::mem::size_of::<Path>() as u64;
        slots_bytes + stash_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find() {
        let mut t = TaffyCuckoo::create_with_bytes(1 << 16).unwrap();
        for h in 0..2000u64 {
            let hash = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
            t.insert_hash(hash).unwrap();
        }
        for h in 0..2000u64 {
            let hash = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
            assert!(t.find_hash(hash), "missing hash for h={h}");
        }
    }

    #[test]
    fn no_false_negatives_through_upsizes() {
        let mut t = TaffyCuckoo::create_with_bytes(4096).unwrap();
        let mut inserted = Vec::new();
        for h in 0..50_000u64 {
            let hash = h.wrapping_mul(0x2545F4914F6CDD1D).wrapping_add(7);
            t.insert_hash(hash).unwrap();
            inserted.push(hash);
        }
        for &h in &inserted {
            assert!(t.find_hash(h));
        }
    }

    #[test]
    fn occupied_never_exceeds_capacity() {
        let mut t = TaffyCuckoo::create_with_bytes(8192).unwrap();
        for h in 0..30_000u64 {
            let hash = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(3);
            t.insert_hash(hash).unwrap();
            assert!(t.occupied <= t.capacity());
        }
    }

    #[test]
    fn union_preserves_membership_of_both_inputs() {
        let mut a = TaffyCuckoo::create_with_bytes(4096).unwrap();
        let mut b = TaffyCuckoo::create_with_bytes(4096).unwrap();
        let mut a_hashes = Vec::new();
        let mut b_hashes = Vec::new();
        for h in 0..500u64 {
            let ha = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(11);
            a.insert_hash(ha).unwrap();
            a_hashes.push(ha);
            let hb = h.wrapping_mul(0x2545F4914F6CDD1D).wrapping_add(13);
            b.insert_hash(hb).unwrap();
            b_hashes.push(hb);
        }
        let u = a.union(&b);
        for h in a_hashes {
            assert!(u.find_hash(h));
        }
        for h in b_hashes {
            assert!(u.find_hash(h));
        }
    }

    #[test]
    fn union_across_different_log_side_sizes_preserves_membership() {
        // `a` and `b` get different byte budgets so they land on different
        // log_side_size values, exercising union_help's two grow branches
        // instead of only the that_log_side_size == here.log_side_size one.
        let mut a = TaffyCuckoo::create_with_bytes(256).unwrap();
        let mut b = TaffyCuckoo::create_with_bytes(65536).unwrap();
        assert_ne!(a.log_side_size, b.log_side_size);

        let mut a_hashes = Vec::new();
        let mut b_hashes = Vec::new();
        for h in 0..400u64 {
            let ha = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(11);
            a.insert_hash(ha).unwrap();
            a_hashes.push(ha);
        }
        for h in 0..4_000u64 {
            let hb = h.wrapping_mul(0x2545F4914F6CDD1D).wrapping_add(13);
            b.insert_hash(hb).unwrap();
            b_hashes.push(hb);
        }

        let u = a.union(&b);
        for h in a_hashes {
            assert!(u.find_hash(h));
        }
        for h in b_hashes {
            assert!(u.find_hash(h));
        }

        // Same union in the other order must also preserve both sides,
        // regardless of which operand has the larger log_side_size.
        let v = b.union(&a);
        for h in 0..400u64 {
            let ha = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(11);
            assert!(v.find_hash(ha));
        }
        for h in 0..4_000u64 {
            let hb = h.wrapping_mul(0x2545F4914F6CDD1D).wrapping_add(13);
            assert!(v.find_hash(hb));
        }
    }

    #[test]
    fn clone_is_independent() {
        let mut t = TaffyCuckoo::create_with_bytes(4096).unwrap();
        t.insert_hash(1).unwrap();
        let c = t.clone();
        assert!(c.find_hash(1));
        t.insert_hash(2).unwrap();
        assert!(!c.find_hash(2));
    }
}
