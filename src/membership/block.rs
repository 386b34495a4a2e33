//! Split-block Bloom filter: the cache-local, fixed-size building block
//! every other filter in this crate is built from.
//!
//! A bucket is 8 lanes of 32-bit words (32 bytes, canonically A=8, W=32).
//! The bucket a hash maps to is chosen by high-multiplication on the full
//! 64-bit hash; within the bucket, each lane gets one bit set, chosen by
//! multiplying the low 32 bits of the hash against a fixed per-lane seed.
//! Once a bit is set it is never cleared, so `find` is monotone in inserts
//! and never produces a false negative.

use crate::common::alloc::AlignedRegion;
use crate::common::error::{FilterError, Result};
use crate::common::validation::{validate_bytes, validate_ndv, validate_probability};
use crate::common::Filter;

const BUCKET_BYTES: u64 = 32;
const LANES: usize = 8;

/// Seeds for the 8 per-lane rehashes, copied verbatim from the reference
/// implementation. Each 64-bit constant supplies two 32-bit lane seeds.
const HASH_SEEDS: [u64; 4] = [
    0x47b6_137b_4497_4d91,
    0x8824_ad5b_a2b7_289d,
    0x7054_95c7_2df1_424b,
    0x9efc_4947_5c6b_fb31,
];

fn bucket_index(hash: u64, num_buckets: u64) -> u64 {
    (((hash as u128) * (num_buckets as u128)) >> 64) as u64
}

fn make_mask(hash: u64) -> [u32; LANES] {
    let hash32 = hash as u32;
    let mut payload = [0u32; LANES];
    for (i, seed) in HASH_SEEDS.iter().enumerate() {
        payload[2 * i] = hash32.wrapping_mul(*seed as u32);
        payload[2 * i + 1] = hash32.wrapping_mul((*seed >> 32) as u32);
    }
    for p in &mut payload {
        *p >>= 32 - 5;
    }
    let mut mask = [0u32; LANES];
    for i in 0..LANES {
        mask[i] = 1u32 << payload[i];
    }
    mask
}

/// A split-block Bloom filter over a fixed number of 32-byte buckets.
#[derive(Debug)]
pub struct Block {
    region: AlignedRegion,
    num_buckets: u64,
}

impl Block {
    /// Construct a filter with exactly `num_buckets` buckets, bypassing the
    /// byte-budget rounding `create_with_bytes` does. Advanced escape hatch
    /// for callers that have already computed bucket counts (e.g.
    /// Taffy-Block, sizing every level itself).
    pub fn with_params(num_buckets: u64) -> Result<Self> {
        if num_buckets == 0 {
            return Err(FilterError::InvalidParameter {
                param: "num_buckets".to_string(),
                value: "0".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }
        let requested = num_buckets * BUCKET_BYTES;
        let mut region = AlignedRegion::alloc_at_most(requested, BUCKET_BYTES)?;
        if !region.zero_filled {
            region.as_mut_slice().fill(0);
        }
        let actual_buckets = region.len() / BUCKET_BYTES;
        Ok(Block {
            region,
            num_buckets: actual_buckets,
        })
    }

    /// Construct a new empty filter sized to hold roughly `bytes` bytes of
    /// payload (rounded down to a whole number of 32-byte buckets, minimum
    /// one bucket).
    ///
    /// # Errors
    /// Returns [`FilterError::AllocationFailure`] if the backing region
    /// cannot be allocated.
    pub fn create_with_bytes(bytes: u64) -> Result<Self> {
        validate_bytes(bytes)?;
        let num_buckets = (bytes.max(BUCKET_BYTES)) / BUCKET_BYTES;
        Self::with_params(num_buckets.max(1))
    }

    /// Construct a filter sized to hold `ndv` distinct values at false
    /// positive probability `fpp`.
    pub fn create_with_ndv_fpp(ndv: u64, fpp: f64) -> Result<Self> {
        validate_ndv(ndv)?;
        validate_probability(fpp, "fpp")?;
        let bytes = sizing::bytes_needed(ndv as f64, fpp);
        Self::create_with_bytes(bytes.max(BUCKET_BYTES))
    }

    /// Number of distinct values this filter can hold at false positive
    /// probability `fpp` without growing.
    pub fn capacity(&self, fpp: f64) -> u64 {
        sizing::capacity(self.size_in_bytes(), fpp)
    }

    /// Model false positive probability for `ndv` inserted values into this
    /// filter's current size.
    pub fn fpp(&self, ndv: u64) -> f64 {
        sizing::fpp(ndv as f64, self.size_in_bytes() as f64)
    }

    fn buckets(&self) -> &[[u32; LANES]] {
        // SAFETY: region is 32-byte aligned and sized to a whole number of
        // 32-byte buckets; [u32; 8] has the same layout.
        unsafe {
            std::slice::from_raw_parts(
                self.region.as_ptr() as *const [u32; LANES],
                self.num_buckets as usize,
            )
        }
    }

    fn buckets_mut(&mut self) -> &mut [[u32; LANES]] {
        // SAFETY: see `buckets`.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.region.as_ptr() as *mut [u32; LANES],
                self.num_buckets as usize,
            )
        }
    }

    /// Little-endian per-word serialization: 8 lanes * 4 bytes per bucket.
    /// The byte count alone must be remembered out-of-band by the caller;
    /// no bucket count is encoded in the stream.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.num_buckets * BUCKET_BYTES) as usize);
        for bucket in self.buckets() {
            for word in bucket {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
        out
    }

    /// OR the serialized bytes of another (same-size) filter's snapshot
    /// into this one, so appending snapshots is a legal operation.
    ///
    /// # Errors
    /// Returns [`FilterError::DeserializationError`] if `bytes` is not
    /// exactly `size_in_bytes()` long.
    pub fn deserialize_into(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 != self.size_in_bytes() {
            return Err(FilterError::DeserializationError(format!(
                "expected {} bytes, got {}",
                self.size_in_bytes(),
                bytes.len()
            )));
        }
        for (bucket, chunk) in self.buckets_mut().iter_mut().zip(bytes.chunks_exact(32)) {
            for (word, word_bytes) in bucket.iter_mut().zip(chunk.chunks_exact(4)) {
                *word |= u32::from_le_bytes(word_bytes.try_into().expect("4-byte chunk"));
            }
        }
        Ok(())
    }
}

impl Filter for Block {
    fn insert_hash(&mut self, hash: u64) -> Result<()> {
        let idx = bucket_index(hash, self.num_buckets) as usize;
        let mask = make_mask(hash);
        let bucket = &mut self.buckets_mut()[idx];
        for i in 0..LANES {
            bucket[i] |= mask[i];
        }
        Ok(())
    }

    fn find_hash(&self, hash: u64) -> bool {
        let idx = bucket_index(hash, self.num_buckets) as usize;
        let mask = make_mask(hash);
        let bucket = &self.buckets()[idx];
        (0..LANES).all(|i| bucket[i] & mask[i] != 0)
    }

    fn size_in_bytes(&self) -> u64 {
        self.num_buckets * BUCKET_BYTES
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Block {
            region: self.region.clone(),
            num_buckets: self.num_buckets,
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.num_buckets == other.num_buckets && self.region.as_slice() == other.region.as_slice()
    }
}

/// Bytes needed to hold `ndv` distinct values at false positive probability
/// `fpp`, exposed for [`crate::membership::taffy_block::TaffyBlock`] to
/// precompute its per-level sizes without constructing a throwaway filter.
pub(crate) fn bytes_needed_for(ndv: f64, fpp: f64) -> u64 {
    sizing::bytes_needed(ndv, fpp)
}

/// Distinct values a filter of `bytes` bytes can hold without exceeding
/// `fpp`, exposed for [`crate::membership::taffy_block::TaffyBlock`]'s
/// initial-level floor computation.
pub(crate) fn capacity_for(bytes: u64, fpp: f64) -> u64 {
    sizing::capacity(bytes, fpp)
}

/// Numerical sizing math from Putze, Sanders & Singler's "Cache-, Hash- and
/// Space-Efficient Bloom Filters" (equation 3), specialized to this crate's
/// canonical 8-lane/32-bit bucket shape. Kept private: the public surface
/// is `Block::{create_with_ndv_fpp, capacity, fpp}`.
mod sizing {
    const WORD_BITS: f64 = 32.0;
    const BUCKET_WORDS: f64 = 8.0;
    const HASH_BITS: f64 = 32.0;
    const BUCKET_BYTES: u64 = 32;

    /// Model false positive probability for `ndv` distinct values inserted
    /// into a filter of `bytes` bytes.
    pub fn fpp(ndv: f64, bytes: f64) -> f64 {
        fpp_detail(ndv, bytes, WORD_BITS, BUCKET_WORDS, HASH_BITS)
    }

    /// Bytes needed to hold `ndv` distinct values at false positive
    /// probability `fpp`, rounded up to a whole number of buckets.
    pub fn bytes_needed(ndv: f64, fpp: f64) -> u64 {
        bytes_needed_detail(ndv, fpp, WORD_BITS, BUCKET_WORDS, HASH_BITS)
    }

    /// Distinct values a filter of `bytes` bytes can hold without exceeding
    /// `fpp`.
    pub fn capacity(bytes: u64, fpp: f64) -> u64 {
        capacity_detail(bytes, fpp, WORD_BITS, BUCKET_WORDS, HASH_BITS)
    }

    fn fpp_detail(ndv: f64, bytes: f64, word_bits: f64, bucket_words: f64, hash_bits: f64) -> f64 {
        if ndv == 0.0 {
            return 0.0;
        }
        if bytes <= 0.0 {
            return 1.0;
        }
        if ndv / (bytes * 8.0) > 3.0 {
            return 1.0;
        }

        let lam = bucket_words * word_bits / ((bytes * 8.0) / ndv);
        let loglam = lam.ln();
        let log1collide = -hash_bits * 2.0f64.ln();
        let mut result = 0.0;
        const MAX_J: u64 = 10000;
        for j in 0..MAX_J {
            let i = MAX_J - 1 - j;
            let i_f = i as f64;
            let logp = i_f * loglam - lam - ln_gamma(i_f + 1.0);
            let logfinner = bucket_words * (1.0 - (1.0 - 1.0 / word_bits).powf(i_f)).ln();
            let logcollide = i_f.ln() + log1collide;
            result += (logp + logfinner).exp() + (logp + logcollide).exp();
        }
        if result > 1.0 {
            1.0
        } else {
            result
        }
    }

    fn bytes_needed_detail(
        ndv: f64,
        fpp: f64,
        word_bits: f64,
        bucket_words: f64,
        hash_bits: f64,
    ) -> u64 {
        let bucket_bytes = (word_bits * bucket_words / 8.0) as u64;
        let mut result: u64 = 1;
        while fpp_detail(ndv, result as f64, word_bits, bucket_words, hash_bits) > fpp {
            let doubled = result.wrapping_mul(2);
            if doubled < result {
                return result;
            }
            result = doubled;
        }
        if result <= bucket_bytes {
            return bucket_bytes;
        }
        let mut lo: u64 = 0;
        while lo + 1 < result {
            let mid = lo + (result - lo) / 2;
            let test = fpp_detail(ndv, mid as f64, word_bits, bucket_words, hash_bits);
            if test < fpp {
                result = mid;
            } else if test == fpp {
                return (mid + bucket_bytes - 1) / bucket_bytes * bucket_bytes;
            } else {
                lo = mid;
            }
        }
        (result + bucket_bytes - 1) / bucket_bytes * bucket_bytes
    }

    fn capacity_detail(
        bytes: u64,
        fpp: f64,
        word_bits: f64,
        bucket_words: f64,
        hash_bits: f64,
    ) -> u64 {
        let mut result: u64 = 1;
        while fpp_detail(result as f64, bytes as f64, word_bits, bucket_words, hash_bits) < fpp {
            result *= 2;
        }
        if result == 1 {
            return 0;
        }
        let mut lo: u64 = 0;
        while lo + 1 < result {
            let mid = lo + (result - lo) / 2;
            let test = fpp_detail(mid as f64, bytes as f64, word_bits, bucket_words, hash_bits);
            if test < fpp {
                lo = mid;
            } else if test == fpp {
                return mid;
            } else {
                result = mid;
            }
        }
        lo
    }

    /// Lanczos approximation to the natural log of the gamma function.
    /// Not present in `std`; the reference implementation leans on libm's
    /// `lgamma`, which Rust does not expose without an extra dependency, so
    /// this numerical routine stays in-crate like the rest of `sizing`.
    fn ln_gamma(x: f64) -> f64 {
        const G: f64 = 7.0;
        const COEFFS: [f64; 9] = [
            0.999_999_999_999_809_9,
            676.520_368_121_885_1,
            -1259.139_216_722_402_8,
            771.323_428_777_653_1,
            -176.615_029_162_140_6,
            12.507_343_278_686_905,
            -0.138_571_095_265_720_12,
            9.984_369_578_019_572e-6,
            1.505_632_735_149_311_6e-7,
        ];

        if x < 0.5 {
            let pi = std::f64::consts::PI;
            (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x)
        } else {
            let x = x - 1.0;
            let t = x + G + 0.5;
            let mut a = COEFFS[0];
            for (i, c) in COEFFS.iter().enumerate().skip(1) {
                a += c / (x + i as f64);
            }
            0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn fpp_decreases_with_more_bytes() {
            let small = fpp(1000.0, 1024.0);
            let large = fpp(1000.0, 1024.0 * 64.0);
            assert!(large < small);
        }

        #[test]
        fn bytes_needed_rounds_to_bucket_multiple() {
            let bytes = bytes_needed(1000.0, 0.01);
            assert_eq!(bytes % BUCKET_BYTES, 0);
            assert!(bytes > 0);
        }

        #[test]
        fn capacity_roughly_inverts_bytes_needed() {
            let bytes = bytes_needed(1000.0, 0.01);
            let cap = capacity(bytes, 0.01);
            // The binary searches bound each other loosely, not exactly.
            assert!(cap > 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find() {
        let mut b = Block::create_with_bytes(16 * 1024).unwrap();
        for h in 0..1000u64 {
            let hash = h.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
            b.insert_hash(hash).unwrap();
            assert!(b.find_hash(hash));
        }
    }

    #[test]
    fn persistence_under_load_seeded() {
        // Concrete scenario: Block filter of 16000 bytes, 16000 random
        // hashes from a fixed seed; every previously inserted hash must
        // still be found after every subsequent insert.
        use rand::rngs::StdRng;
        use rand::{RngCore, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
        let mut b = Block::create_with_bytes(16_000).unwrap();
        let mut inserted = Vec::with_capacity(16_000);
        for _ in 0..16_000 {
            let h = rng.next_u64();
            b.insert_hash(h).unwrap();
            inserted.push(h);
            for &prior in &inserted {
                assert!(b.find_hash(prior));
            }
        }
    }

    #[test]
    fn clone_is_independent() {
        let mut b = Block::create_with_bytes(1024).unwrap();
        b.insert_hash(42).unwrap();
        let c = b.clone();
        assert!(c.find_hash(42));
        assert_eq!(b, c);
        b.insert_hash(43).unwrap();
        assert_ne!(b, c);
    }

    #[test]
    fn serialize_round_trip_ors_into_target() {
        let mut b = Block::create_with_bytes(1024).unwrap();
        for h in 0..50u64 {
            b.insert_hash(h * 7 + 1).unwrap();
        }
        let bytes = b.serialize();
        let mut target = Block::create_with_bytes(b.size_in_bytes()).unwrap();
        target.deserialize_into(&bytes).unwrap();
        assert_eq!(b, target);
    }

    #[test]
    fn zero_byte_budget_rejected() {
        assert!(Block::create_with_bytes(0).is_err());
    }

    #[test]
    fn size_in_bytes_matches_bucket_count() {
        let b = Block::create_with_bytes(1024).unwrap();
        assert_eq!(b.size_in_bytes() % 32, 0);
    }
}
