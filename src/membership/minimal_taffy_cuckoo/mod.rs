//! Minimal Taffy-Cuckoo: a Taffy-Cuckoo variant that grows incrementally.
//!
//! Instead of doubling the whole table at once, this variant keeps 32
//! internal *levels* and doubles them one at a time as a `cursor` advances;
//! once all 32 have doubled, the cursor wraps to 0, the nominal level size
//! `L` increments, and the two per-side permutations swap roles (`lo`
//! becomes `hi` and vice versa). This trades Taffy-Cuckoo's large, rare
//! reallocations for many small, cheap ones.

mod path;

use crate::common::error::Result;
use crate::common::feistel::Feistel;
use crate::common::pcg::PcgRandom;
use crate::common::tail;
use crate::common::validation::validate_bytes;
use crate::common::Filter;

pub(crate) use path::{K_HEAD_SIZE, LEVELS, LOG_SLOTS, SLOTS};
use path::{re_path, re_path_upsize, to_path, Path, Slot};

const ENTROPY: [u64; 24] = [
    0x2ba7538ee1234073,
    0xfcc3777539b147d6,
    0x6086c563576347e7,
    0x52eff34ee1764465,
    0x8639cbf57f264867,
    0x5a31ee34f0224ccb,
    0x07a1cb8140744ee6,
    0xf2296cf6a6524e9f,
    0x28a31cec9f6d4484,
    0x688f3fe9de7245f6,
    0x1dc17831966b41a2,
    0xf227166e425e4b0c,
    0x4a2a62bafc694440,
    0x2e6bbea775e3429d,
    0x5687dd060ba64169,
    0xc5d95e8a38a44789,
    0xd30480ab74084edc,
    0xd72483670ec14df3,
    0x0414954940374787,
    0x8cd86adfda93493f,
    0x50d61c3272a24ccb,
    0x40cb1e4f0da34cc3,
    0xb88f09c3af35472e,
    0x8de6d01bb8a849a5,
];

const INSERT_TTL: i32 = 128;

type LevelData = Vec<[Slot; SLOTS]>;

#[derive(Clone, Debug)]
struct Side {
    hi: Feistel,
    lo: Feistel,
    levels: [LevelData; LEVELS],
    stash: Vec<Path>,
}

impl Side {
    fn new(entropy_block: &[u64], log_level_size: u32) -> Self {
        let hi = Feistel::new([
            entropy_block[0],
            entropy_block[1],
            entropy_block[2],
            entropy_block[3],
        ]);
        let lo = Feistel::new([
            entropy_block[6],
            entropy_block[7],
            entropy_block[8],
            entropy_block[9],
        ]);
        let levels = std::array::from_fn(|_| new_level(log_level_size));
        Side {
            hi,
            lo,
            levels,
            stash: Vec::new(),
        }
    }
}

fn new_level(log_level_size: u32) -> LevelData {
    vec![[Slot::empty(); SLOTS]; 1usize << log_level_size]
}

fn level_insert(level: &mut LevelData, mut p: Path, rng: &mut PcgRandom) -> Path {
    debug_assert_ne!(p.slot.tail(), 0);
    let bucket = &mut level[p.bucket as usize];
    for slot in bucket.iter_mut() {
        if slot.is_empty() {
            *slot = p.slot;
            p.slot = Slot::new(p.slot.long_fp(), p.slot.fingerprint(), 0);
            return p;
        }
        if slot.long_fp() == p.slot.long_fp()
            && slot.fingerprint() == p.slot.fingerprint()
            && tail::is_prefix_of(slot.tail(), p.slot.tail())
        {
            return p;
        }
    }
    let i = (rng.get() as usize) % SLOTS;
    let mut result = p;
    result.slot = bucket[i];
    bucket[i] = p.slot;
    result
}

fn level_find(level: &[[Slot; SLOTS]], p: Path) -> bool {
    for slot in &level[p.bucket as usize] {
        if !slot.is_empty()
            && slot.long_fp() == p.slot.long_fp()
            && slot.fingerprint() == p.slot.fingerprint()
            && tail::is_prefix_of(slot.tail(), p.slot.tail())
        {
            return true;
        }
    }
    false
}

fn side_find(side: &Side, p: Path) -> bool {
    for s in &side.stash {
        if !s.slot.is_empty()
            && s.level == p.level
            && s.bucket == p.bucket
            && s.slot.long_fp() == p.slot.long_fp()
            && s.slot.fingerprint() == p.slot.fingerprint()
            && tail::is_prefix_of(s.slot.tail(), p.slot.tail())
        {
            return true;
        }
    }
    level_find(&side.levels[p.level as usize], p)
}

/// A Minimal Taffy-Cuckoo filter.
#[derive(Clone, Debug)]
pub struct MinimalTaffyCuckoo {
    sides: [Side; 2],
    cursor: u32,
    log_side_size: u32,
    rng: PcgRandom,
    occupied: u64,
}

impl MinimalTaffyCuckoo {
    fn create(log_side_size: u32, entropy: &[u64; 24]) -> Self {
        MinimalTaffyCuckoo {
            sides: [
                Side::new(&entropy[0..12], log_side_size),
                Side::new(&entropy[12..24], log_side_size),
            ],
            cursor: 0,
            log_side_size,
            rng: PcgRandom::new(LOG_SLOTS),
            occupied: 0,
        }
    }

    /// Construct a filter. As in the reference implementation, the byte
    /// budget only validates the request; the filter always starts at the
    /// smallest internal size and grows level-by-level from there.
    pub fn create_with_bytes(bytes: u64) -> Result<Self> {
        validate_bytes(bytes)?;
        Ok(Self::create(0, &ENTROPY))
    }

    /// Total number of fingerprint slots across both sides, all levels.
    pub fn capacity(&self) -> u64 {
        let base = 1u64 << self.log_side_size;
        2 + 2 * SLOTS as u64 * (base * LEVELS as u64 + base * self.cursor as u64)
    }

    fn stash_len(&self) -> usize {
        self.sides[0].stash.len() + self.sides[1].stash.len()
    }

    fn needs_upsize(&self) -> bool {
        let cap = self.capacity();
        self.occupied > (cap * 9) / 10 || self.occupied + 4 >= cap || self.stash_len() > 8
    }

    fn insert_detail(&mut self, mut current: usize, mut p: Path, mut ttl: i32) {
        debug_assert_ne!(p.slot.tail(), 0);
        loop {
            ttl -= 1;
            if ttl < 0 {
                self.sides[current].stash.push(p);
                self.occupied += 1;
                return;
            }
            let q = p;
            let r = level_insert(&mut self.sides[current].levels[p.level as usize], p, &mut self.rng);
            if r.slot.tail() == 0 {
                self.occupied += 1;
                return;
            }
            if r == q {
                return;
            }
            let other = 1 - current;
            let from_lo = self.sides[current].lo;
            let from_hi = self.sides[current].hi;
            let to_lo = self.sides[other].lo;
            let to_hi = self.sides[other].hi;
            let (next, extra) = re_path(
                r,
                &from_lo,
                &from_hi,
                &to_lo,
                &to_hi,
                self.log_side_size,
                self.log_side_size,
                self.cursor,
                self.cursor,
            );
            if extra.slot.tail() != 0 {
                self.insert_detail(other, extra, ttl);
            }
            p = next;
            current = other;
        }
    }

    fn upsize(&mut self) {
        let mut last_data: [LevelData; 2] = [Vec::new(), Vec::new()];
        for s in 0..2 {
            last_data[s] = std::mem::replace(
                &mut self.sides[s].levels[self.cursor as usize],
                new_level(self.log_side_size + 1),
            );
        }
        self.cursor += 1;

        let mut saved_stash: [Vec<Path>; 2] = [Vec::new(), Vec::new()];
        for s in 0..2 {
            let stash = std::mem::take(&mut self.sides[s].stash);
            self.occupied -= stash.len() as u64;
            saved_stash[s] = stash;
        }

        for s in 0..2 {
            let stash = std::mem::take(&mut saved_stash[s]);
            for p in stash {
                let lo = self.sides[s].lo;
                let hi = self.sides[s].hi;
                let (r, q) = re_path_upsize(p, &lo, &hi, self.log_side_size, self.cursor - 1);
                if q.slot.tail() != 0 {
                    self.insert_detail(s, q, INSERT_TTL);
                }
                self.insert_detail(s, r, INSERT_TTL);
            }
        }

        for s in 0..2 {
            let old_level = std::mem::take(&mut last_data[s]);
            for (i, bucket) in old_level.into_iter().enumerate() {
                for slot in bucket {
                    if slot.is_empty() {
                        continue;
                    }
                    self.occupied -= 1;
                    let p = Path {
                        slot,
                        level: self.cursor - 1,
                        bucket: i as u64,
                    };
                    let lo = self.sides[s].lo;
                    let hi = self.sides[s].hi;
                    let (r, q) = re_path_upsize(p, &lo, &hi, self.log_side_size, self.cursor - 1);
                    if q.slot.tail() != 0 {
                        self.insert_detail(s, q, INSERT_TTL);
                    }
                    self.insert_detail(s, r, INSERT_TTL);
                }
            }
        }

        if self.cursor == LEVELS as u32 {
            self.cursor = 0;
            self.log_side_size += 1;
            for s in 0..2 {
                std::mem::swap(&mut self.sides[s].lo, &mut self.sides[s].hi);
            }
        }
    }
}

impl Filter for MinimalTaffyCuckoo {
    fn insert_hash(&mut self, hash: u64) -> Result<()> {
        while self.needs_upsize() {
            self.upsize();
        }
        let p = to_path(hash, &self.sides[0].hi, self.cursor, self.log_side_size, false);
        self.insert_detail(0, p, INSERT_TTL);
        Ok(())
    }

    fn find_hash(&self, hash: u64) -> bool {
        for s in 0..2 {
            let p = to_path(hash, &self.sides[s].lo, self.cursor, self.log_side_size, true);
            if p.slot.tail() != 0 && side_find(&self.sides[s], p) {
                return true;
            }
            let p = to_path(hash, &self.sides[s].hi, self.cursor, self.log_side_size, false);
            if p.slot.tail() != 0 && side_find(&self.sides[s], p) {
                return true;
            }
        }
        false
    }

    fn size_in_bytes(&self) -> u64 {
        let slot_bytes = self.capacity() * std::mem::size_of::<Slot>() as u64;
        let stash_bytes = self.stash_len() as u64 * std::mem::size_of::<Path>() as u64;
        slot_bytes + stash_bytes
    }
}
