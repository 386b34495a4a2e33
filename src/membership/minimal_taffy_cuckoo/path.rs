//! Path arithmetic for the Minimal Taffy-Cuckoo filter.
//!
//! Unlike the plain Taffy-Cuckoo filter, a raw key here maps to a *level*
//! (via the top `kLogLevels` bits of a permuted value) as well as a bucket
//! and fingerprint, and the bucket/fingerprint split depends on whether the
//! level has already been doubled (`level < cursor`) and on which of the
//! two permutations per side (`lo`, for short inputs; `hi`, for long ones)
//! produced the path.

use crate::common::feistel::Feistel;
use crate::common::tail;

pub const K_HEAD_SIZE: u32 = 9;
pub const K_TAIL_SIZE: u32 = 5;
pub const LOG_LEVELS: u32 = 5;
pub const LEVELS: usize = 1 << LOG_LEVELS;
pub const LOG_SLOTS: u32 = 2;
pub const SLOTS: usize = 1 << LOG_SLOTS;

fn mask(w: u32, x: u64) -> u64 {
    if w >= 64 {
        x
    } else {
        x & ((1u64 << w) - 1)
    }
}

/// A packed `{long_fp: 1, fingerprint: kHeadSize, tail: kTailSize+1}` slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Slot(u16);

const TAIL_SHIFT: u32 = K_HEAD_SIZE;
const LONG_FP_SHIFT: u32 = K_HEAD_SIZE + K_TAIL_SIZE + 1;

impl Slot {
    pub fn new(long_fp: bool, fingerprint: u32, tail: u32) -> Self {
        let fp = fingerprint & ((1 << K_HEAD_SIZE) - 1);
        let t = tail & ((1 << (K_TAIL_SIZE + 1)) - 1);
        let lfp = if long_fp { 1 } else { 0 };
        Slot((fp | (t << TAIL_SHIFT) | (lfp << LONG_FP_SHIFT)) as u16)
    }

    pub fn empty() -> Self {
        Slot(0)
    }

    pub fn is_empty(&self) -> bool {
        self.tail() == 0
    }

    pub fn fingerprint(&self) -> u32 {
        (self.0 as u32) & ((1 << K_HEAD_SIZE) - 1)
    }

    pub fn tail(&self) -> u32 {
        ((self.0 as u32) >> TAIL_SHIFT) & ((1 << (K_TAIL_SIZE + 1)) - 1)
    }

    pub fn long_fp(&self) -> bool {
        ((self.0 as u32) >> LONG_FP_SHIFT) & 1 != 0
    }
}

/// A slot together with the level and bucket it lives in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Path {
    pub slot: Slot,
    pub level: u32,
    pub bucket: u64,
}

/// Derive a path from a raw key under permutation `f`.
///
/// `full_is_short` selects which of a side's two permutations this is: when
/// true, the path is only valid for levels already past `cursor` (a short,
/// post-growth fingerprint); when false, the path covers the whole table
/// with a longer fingerprint (and a shorter index) for not-yet-doubled
/// levels.
pub fn to_path(raw: u64, f: &Feistel, cursor: u32, log_level_size: u32, full_is_short: bool) -> Path {
    let fis = full_is_short as u32;
    let total_width = LOG_LEVELS + log_level_size + K_HEAD_SIZE - fis + K_TAIL_SIZE;
    let pre_hash_level_index_fp_and_tail = raw >> (64 - total_width);
    let raw_tail = mask(K_TAIL_SIZE, pre_hash_level_index_fp_and_tail);
    let pre_hash_level_index_and_fp = pre_hash_level_index_fp_and_tail >> K_TAIL_SIZE;

    let permute_width = LOG_LEVELS + log_level_size + K_HEAD_SIZE - fis;
    let hashed_level_index_and_fp = f.permute_forward(permute_width, pre_hash_level_index_and_fp);

    let level = (hashed_level_index_and_fp >> (log_level_size + K_HEAD_SIZE - fis)) as u32;
    let big_index = (level < cursor) as u32;

    if big_index != 0 && full_is_short {
        return Path {
            slot: Slot::empty(),
            level,
            bucket: 0,
        };
    }

    let bucket_width = log_level_size + big_index;
    let bucket = mask(
        bucket_width,
        hashed_level_index_and_fp >> (K_HEAD_SIZE - fis - big_index),
    );
    let long_fp = big_index == 0 && !full_is_short;
    let fingerprint_width = K_HEAD_SIZE - fis - big_index;
    let fingerprint = mask(fingerprint_width, hashed_level_index_and_fp) as u32;
    let tail = (raw_tail * 2 + 1) as u32;

    Path {
        slot: Slot::new(long_fp, fingerprint, tail),
        level,
        bucket,
    }
}

/// Invert [`to_path`], recovering the top bits of the original raw key
/// (minus the tail, which can't be told apart from trailing zeros once
/// appended).
pub fn from_path_no_tail(p: Path, f: &Feistel, level_size: u32, fingerprint_size: u32) -> u64 {
    let hashed_level_index_and_fp =
        (((p.level as u64) << level_size) | p.bucket) << fingerprint_size | p.slot.fingerprint() as u64;
    let width = LOG_LEVELS + level_size + fingerprint_size;
    let pre_hashed_index_and_fp = f.permute_backward(width, hashed_level_index_and_fp);
    pre_hashed_index_and_fp << (64 - width)
}

/// Re-derive `p` (valid at `log_size`/`from_cursor`) for the same filter
/// immediately after its cursor level was doubled (`from_cursor + 1`).
///
/// Returns `(main, secondary)`: `main` is always valid and should always be
/// (re-)inserted; `secondary` should only be inserted if its tail is
/// non-zero (the "tail ran out, split into two paths" case).
pub fn re_path_upsize(p: Path, flo: &Feistel, fhi: &Feistel, log_size: u32, from_cursor: u32) -> (Path, Path) {
    debug_assert_ne!(p.slot.tail(), 0);
    let to_cursor = from_cursor + 1;
    let empty_secondary = Path {
        slot: Slot::empty(),
        level: 0,
        bucket: 0,
    };

    if p.level < from_cursor {
        let key = from_path_no_tail(p, fhi, log_size + 1, K_HEAD_SIZE - 1);
        let mut q = to_path(key, fhi, to_cursor, log_size, false);
        q.slot = Slot::new(q.slot.long_fp(), q.slot.fingerprint(), p.slot.tail());
        return (q, empty_secondary);
    }
    if p.slot.long_fp() {
        let key = from_path_no_tail(p, fhi, log_size, K_HEAD_SIZE);
        let mut q = to_path(key, fhi, to_cursor, log_size, false);
        q.slot = Slot::new(q.slot.long_fp(), q.slot.fingerprint(), p.slot.tail());
        return (q, empty_secondary);
    }

    let key = from_path_no_tail(p, flo, log_size, K_HEAD_SIZE - 1);
    let mut q = to_path(key, flo, to_cursor, log_size, true);
    if q.level >= to_cursor {
        q.slot = Slot::new(q.slot.long_fp(), q.slot.fingerprint(), p.slot.tail());
        return (q, empty_secondary);
    }

    if p.slot.tail() != tail::empty(K_TAIL_SIZE) {
        let stolen = (p.slot.tail() >> K_TAIL_SIZE) as u64;
        let k = key | (stolen << (64 - LOG_LEVELS - log_size - K_HEAD_SIZE));
        let mut q2 = to_path(k, fhi, to_cursor, log_size, false);
        q2.slot = Slot::new(q2.slot.long_fp(), q2.slot.fingerprint(), p.slot.tail() << 1);
        return (q2, empty_secondary);
    }

    let mut out = to_path(key, fhi, to_cursor, log_size, false);
    out.slot = Slot::new(out.slot.long_fp(), out.slot.fingerprint(), p.slot.tail());
    let k = key | (1u64 << (64 - LOG_LEVELS - log_size - K_HEAD_SIZE));
    let mut q2 = to_path(k, fhi, to_cursor, log_size, false);
    q2.slot = Slot::new(q2.slot.long_fp(), q2.slot.fingerprint(), p.slot.tail());
    (q2, out)
}

/// The general form of [`re_path_upsize`]: re-derive `p` under a
/// (possibly) different side's permutations and a (possibly) different
/// table size/cursor. Used both to move a displaced path to the other side
/// during insert, and (with `log_from_size != log_to_size`) during upsize
/// of the saved cursor level's contents.
#[allow(clippy::too_many_arguments)]
pub fn re_path(
    p: Path,
    from_short: &Feistel,
    from_long: &Feistel,
    to_short: &Feistel,
    to_long: &Feistel,
    log_from_size: u32,
    log_to_size: u32,
    from_cursor: u32,
    to_cursor: u32,
) -> (Path, Path) {
    debug_assert_ne!(p.slot.tail(), 0);
    let upsize = log_to_size != log_from_size;
    let empty_secondary = Path {
        slot: Slot::empty(),
        level: 0,
        bucket: 0,
    };

    if p.level < from_cursor {
        let key = from_path_no_tail(p, from_long, log_from_size + 1, K_HEAD_SIZE - 1);
        let mut q = to_path(key, to_long, to_cursor, log_to_size, false);
        q.slot = Slot::new(q.slot.long_fp(), q.slot.fingerprint(), p.slot.tail());
        return (q, empty_secondary);
    }
    if p.slot.long_fp() {
        let key = from_path_no_tail(p, from_long, log_from_size, K_HEAD_SIZE);
        let f = if upsize { to_short } else { to_long };
        let mut q = to_path(key, f, to_cursor, log_to_size, upsize);
        q.slot = Slot::new(q.slot.long_fp(), q.slot.fingerprint(), p.slot.tail());
        return (q, empty_secondary);
    }

    let key = from_path_no_tail(p, from_short, log_from_size, K_HEAD_SIZE - 1);
    let mut q = to_path(key, to_short, to_cursor, log_to_size, true);
    if !upsize && q.level >= to_cursor {
        q.slot = Slot::new(q.slot.long_fp(), q.slot.fingerprint(), p.slot.tail());
        return (q, empty_secondary);
    }

    if p.slot.tail() != tail::empty(K_TAIL_SIZE) {
        let stolen = (p.slot.tail() >> K_TAIL_SIZE) as u64;
        let k = key | (stolen << (64 - LOG_LEVELS - log_from_size - K_HEAD_SIZE));
        let mut q2 = to_path(k, to_long, to_cursor, log_to_size, false);
        q2.slot = Slot::new(q2.slot.long_fp(), q2.slot.fingerprint(), p.slot.tail() << 1);
        return (q2, empty_secondary);
    }

    let mut out = to_path(key, to_long, to_cursor, log_to_size, false);
    out.slot = Slot::new(out.slot.long_fp(), out.slot.fingerprint(), p.slot.tail());
    let k = key | (1u64 << (64 - LOG_LEVELS - log_from_size - K_HEAD_SIZE));
    let mut q2 = to_path(k, to_long, to_cursor, log_to_size, false);
    q2.slot = Slot::new(q2.slot.long_fp(), q2.slot.fingerprint(), p.slot.tail());
    (q2, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTROPY: [u64; 4] = [
        0x2ba7538ee1234073,
        0xfcc3777539b147d6,
        0x6086c563576347e7,
        0x52eff34ee1764465,
    ];

    #[test]
    fn long_path_round_trips_through_from_path_no_tail() {
        let f = Feistel::new(ENTROPY);
        let raw = 0x123456789abcdef0u64;
        let log_level_size = 4u32;
        let p = to_path(raw, &f, 0, log_level_size, false);
        assert_ne!(p.slot.tail(), 0);
        let recovered = from_path_no_tail(p, &f, log_level_size, K_HEAD_SIZE);
        let p2 = to_path(recovered, &f, 0, log_level_size, false);
        assert_eq!(p.level, p2.level);
        assert_eq!(p.bucket, p2.bucket);
        assert_eq!(p.slot.fingerprint(), p2.slot.fingerprint());
    }

    #[test]
    fn short_path_invalid_before_cursor() {
        let f = Feistel::new(ENTROPY);
        // With cursor = levels, every level index is < cursor, so every
        // short (full_is_short = true) path must come back invalid.
        let raw = 0xdeadbeefcafef00du64;
        let p = to_path(raw, &f, LEVELS as u32, 4, true);
        assert_eq!(p.slot.tail(), 0);
    }

    #[test]
    fn slot_roundtrips_long_fp_bit() {
        let s = Slot::new(true, 5, 3);
        assert!(s.long_fp());
        let s2 = Slot::new(false, 5, 3);
        assert!(!s2.long_fp());
        assert_eq!(s.fingerprint(), s2.fingerprint());
        assert_eq!(s.tail(), s2.tail());
    }

    #[test]
    fn exhaustive_path_round_trip_over_shifts_and_cursors() {
        let f = Feistel::new([1, 0, 1, 0]);
        let base_raw = 0x123456789abcdef0u64;
        let log_level_size = 4u32;
        for i in 0..64u32 {
            let raw = base_raw << i;
            for cursor in 0..LEVELS as u32 {
                for full_is_short in [false, true] {
                    let p = to_path(raw, &f, cursor, log_level_size, full_is_short);
                    if p.slot.tail() == 0 {
                        continue;
                    }
                    let big_index = (p.level < cursor) as u32;
                    let fis = full_is_short as u32;
                    let fingerprint_size = K_HEAD_SIZE - fis - big_index;
                    let bucket_width = log_level_size + big_index;
                    let recovered = from_path_no_tail(p, &f, bucket_width, fingerprint_size);
                    let p2 = to_path(recovered, &f, cursor, log_level_size, full_is_short);
                    assert_eq!(p.level, p2.level, "i={i} cursor={cursor} short={full_is_short}");
                    assert_eq!(p.bucket, p2.bucket, "i={i} cursor={cursor} short={full_is_short}");
                    assert_eq!(
                        p.slot.fingerprint(),
                        p2.slot.fingerprint(),
                        "i={i} cursor={cursor} short={full_is_short}"
                    );
                    assert_eq!(
                        p.slot.long_fp(),
                        p2.slot.long_fp(),
                        "i={i} cursor={cursor} short={full_is_short}"
                    );
                }
            }
        }
    }

    #[test]
    fn re_path_half_identity_matches_direct_to_path() {
        let identity = Feistel::new([1, 0, 1, 0]);
        let other = Feistel::new([
            0x37156873ab534ce7,
            0x5c669c3116114489,
            0xfa52f24f2bc644d6,
            0xcba217328d2f4950,
        ]);
        let base_raw = 0x123456789abcdef0u64;
        let log_level_size = 4u32;
        for i in 0..64u32 {
            let raw = base_raw << i;
            for cursor in 0..LEVELS as u32 {
                let direct = to_path(raw, &other, cursor, log_level_size, false);
                if direct.slot.tail() == 0 {
                    continue;
                }
                let source = to_path(raw, &identity, cursor, log_level_size, false);
                if source.slot.tail() == 0 {
                    continue;
                }
                let (main, secondary) = re_path(
                    source,
                    &identity,
                    &identity,
                    &other,
                    &other,
                    log_level_size,
                    log_level_size,
                    cursor,
                    cursor,
                );
                assert_eq!(secondary.slot.tail(), 0);
                assert_eq!(main.level, direct.level);
                assert_eq!(main.bucket, direct.bucket);
                assert_eq!(main.slot.fingerprint(), direct.slot.fingerprint());
            }
        }
    }

    #[test]
    fn re_path_secondary_output_is_only_meaningful_when_nonzero() {
        // re_path's contract is asymmetric: the first return value is always
        // inserted by the caller, the second only when its tail is nonzero.
        // Exercise both shapes (single-path and split) as they actually
        // arise from upsize, and check the invariant holds either way.
        let f = Feistel::new([
            0x37156873ab534ce7,
            0x5c669c3116114489,
            0xfa52f24f2bc644d6,
            0xcba217328d2f4950,
        ]);
        let log_level_size = 4u32;

        for cursor in 0..LEVELS as u32 {
            for i in 0..64u32 {
                let raw = 0x123456789abcdef0u64.rotate_left(i);
                let source = to_path(raw, &f, cursor, log_level_size, false);
                if source.slot.tail() == 0 {
                    continue;
                }
                let (main, _secondary) =
                    re_path(source, &f, &f, &f, &f, log_level_size, log_level_size, cursor, cursor);
                assert_ne!(main.slot.tail(), 0, "main output must always be insertable");
            }
        }
    }
}
