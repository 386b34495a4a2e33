//! A geometrically expanding stack of [`Block`] filters.
//!
//! Each level is sized so the aggregate false positive probability across
//! all levels stays bounded as the insert count grows without an upper
//! limit known in advance: level `i`'s fpp budget is
//! `fpp / (i+1)^2 * 6/pi^2`, a convergent series summing to at most the
//! target fpp. A new level is only allocated once the current one's `ttl`
//! (inserts remaining before it's considered full) reaches zero; existing
//! levels are never re-inserted into, so `find_hash` must check all of them.

use crate::common::error::{FilterError, Result};
use crate::common::validation::{validate_ndv, validate_probability};
use crate::common::Filter;
use crate::membership::block::Block;

/// Hard cap on the number of levels a Taffy-Block filter can grow to.
/// Beyond this, insert fails with [`FilterError::CapacityExceeded`] rather
/// than behaving in an undefined way.
const MAX_LEVELS: usize = 48;

/// Approximation of pi used by the reference implementation's fpp-budget
/// apportionment. Kept as a literal constant (not `std::f64::consts::PI`)
/// to match the reference's own rounding exactly.
const PI_APPROX: f64 = 3.1415;

fn sum_of_reciprocal_squares() -> f64 {
    6.0 / (PI_APPROX * PI_APPROX)
}

/// A Taffy-Block filter: an online-growable sequence of Block filters.
#[derive(Debug, Clone)]
pub struct TaffyBlock {
    levels: Vec<Block>,
    sizes: Vec<u64>,
    cursor: usize,
    last_ndv: u64,
    ttl: i64,
}

impl TaffyBlock {
    /// Construct a filter initially sized to hold `ndv` distinct values at
    /// false positive probability `fpp`, with headroom precomputed for up
    /// to 48 geometrically-doubling levels beyond that.
    pub fn create_with_ndv_fpp(ndv: u64, fpp: f64) -> Result<Self> {
        validate_ndv(ndv)?;
        validate_probability(fpp, "fpp")?;

        let sum = sum_of_reciprocal_squares();
        let floor = crate::membership::block::capacity_for(1, fpp * sum);
        let ndv = ndv.max(floor);

        let level0 = Block::create_with_ndv_fpp(ndv, fpp * sum)?;
        let mut sizes = Vec::with_capacity(MAX_LEVELS);
        for x in 0..MAX_LEVELS as u64 {
            let level_ndv = (ndv as f64) * 2f64.powi(x as i32);
            let level_fpp = fpp / ((x + 1) as f64).powi(2) * sum;
            sizes.push(crate::membership::block::bytes_needed_for(level_ndv, level_fpp));
        }

        Ok(TaffyBlock {
            levels: vec![level0],
            sizes,
            cursor: 1,
            last_ndv: ndv,
            ttl: ndv as i64,
        })
    }

    fn upsize(&mut self) -> Result<()> {
        if self.cursor >= MAX_LEVELS {
            return Err(FilterError::CapacityExceeded {
                levels: self.cursor,
            });
        }
        self.last_ndv *= 2;
        let level = Block::create_with_bytes(self.sizes[self.cursor])?;
        self.levels.push(level);
        self.cursor += 1;
        self.ttl = self.last_ndv as i64;
        Ok(())
    }

    /// Number of levels currently allocated.
    pub fn levels(&self) -> usize {
        self.cursor
    }
}

impl Filter for TaffyBlock {
    fn insert_hash(&mut self, hash: u64) -> Result<()> {
        if self.ttl <= 0 {
            self.upsize()?;
        }
        self.levels[self.cursor - 1].insert_hash(hash)?;
        self.ttl -= 1;
        Ok(())
    }

    fn find_hash(&self, hash: u64) -> bool {
        self.levels[..self.cursor].iter().any(|level| level.find_hash(hash))
    }

    fn size_in_bytes(&self) -> u64 {
        self.levels[..self.cursor].iter().map(Filter::size_in_bytes).sum()
    }
}
