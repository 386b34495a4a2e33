//! A read-only, fingerprint-only snapshot of a [`super::TaffyCuckoo`].
//!
//! Dropping the tail halves the per-slot footprint (10 bits instead of 16)
//! at the cost of giving up tail-prefix matching and the ability to insert:
//! a frozen filter can only be queried. Four fingerprints pack into one
//! `u64` bucket word; membership testing against a bucket uses a SWAR
//! has-byte-style trick generalized to 10-bit lanes instead of scanning.

use super::path::K_HEAD_SIZE;
use super::TaffyCuckoo;
use crate::common::feistel::Feistel;

const FINGERPRINT_MASK: u64 = (1 << K_HEAD_SIZE) - 1;

/// Magic constant for the 10-bit-lane SWAR "has zero lane" trick: one `1`
/// bit at the bottom of each of the four 10-bit lanes.
const LANE_LOW_BITS: u64 = 0x40100401;
/// One bit at the top of each 10-bit lane (the sign bit for `has_zero`'s
/// borrow trick).
const LANE_HIGH_BITS: u64 = 0x8020080200;

fn has_zero_10(x: u64) -> u64 {
    x.wrapping_sub(LANE_LOW_BITS) & !x & LANE_HIGH_BITS
}

fn has_value_10(x: u64, n: u64) -> u64 {
    has_zero_10(x ^ (LANE_LOW_BITS.wrapping_mul(n)))
}

/// A frozen Taffy-Cuckoo filter.
#[derive(Clone, Debug)]
pub struct FrozenTaffyCuckoo {
    hash: [Feistel; 2],
    log_side_size: u32,
    data: [Vec<u64>; 2],
    stash: [Vec<u64>; 2],
}

/// Build a frozen snapshot from a live filter.
///
/// Each side's stash entries are stored as the permuted `(bucket << kHeadSize)
/// | fingerprint` value so that [`FrozenTaffyCuckoo::find_hash`]'s
/// recomputation of that same quantity from a query key can compare for
/// exact equality, without needing the discarded tail.
pub(super) fn freeze(tcf: &TaffyCuckoo) -> FrozenTaffyCuckoo {
    let log_side_size = tcf.log_side_size;
    let mut data: [Vec<u64>; 2] = [Vec::new(), Vec::new()];
    let mut stash: [Vec<u64>; 2] = [Vec::new(), Vec::new()];
    let hash = [tcf.sides[0].f, tcf.sides[1].f];

    for s in 0..2 {
        for p in &tcf.sides[s].stash {
            let combined = (p.bucket << K_HEAD_SIZE) | p.slot.fingerprint() as u64;
            stash[s].push(combined);
        }
        data[s] = Vec::with_capacity(tcf.sides[s].data.len());
        for bucket in &tcf.sides[s].data {
            let mut packed = 0u64;
            for (lane, slot) in bucket.iter().enumerate() {
                packed |= (slot.fingerprint() as u64) << (K_HEAD_SIZE * lane as u32);
            }
            data[s].push(packed);
        }
    }

    FrozenTaffyCuckoo {
        hash,
        log_side_size,
        data,
        stash,
    }
}

impl FrozenTaffyCuckoo {
    /// Test whether `hash` may have been inserted into the filter this was
    /// frozen from.
    pub fn find_hash(&self, hash: u64) -> bool {
        for s in 0..2 {
            let width = self.log_side_size + K_HEAD_SIZE;
            let y = hash >> (64 - width);
            let permuted = self.hash[s].permute_forward(width, y);
            if self.stash[s].contains(&permuted) {
                return true;
            }
            let bucket = (permuted >> K_HEAD_SIZE) as usize;
            let fingerprint = permuted & FINGERPRINT_MASK;
            if has_value_10(self.data[s][bucket], fingerprint) != 0 {
                return true;
            }
        }
        false
    }

    /// Heap footprint of the packed bucket and stash arrays, in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        let bucket_bytes: u64 = self
            .data
            .iter()
            .map(|d| (d.len() * std::mem::size_of::<u64>()) as u64)
            .sum();
        let stash_bytes: u64 = self
            .stash
            .iter()
            .map(|s| (s.len() * std::mem::size_of::<u64>()) as u64)
            .sum();
        bucket_bytes + stash_bytes
    }
}
