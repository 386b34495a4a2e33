//! Core trait shared by the filter families

use super::error::Result;

/// Common surface implemented by the Block, Taffy-Block, Taffy-Cuckoo, and
/// Minimal-Taffy-Cuckoo filters.
///
/// All operations take pre-hashed 64-bit keys; hashing raw keys into this
/// space is the caller's job (see [`crate::common::hash`]). Construction is
/// deliberately left out of this trait: Block and Taffy-Cuckoo-family
/// filters are naturally constructed `create_with_bytes`, while Block and
/// Taffy-Block are naturally constructed `create_with_ndv_fpp`, and forcing
/// both shapes through one trait method would just paper over that with an
/// unused parameter. Each filter exposes whichever constructor(s) fit it as
/// inherent associated functions.
pub trait Filter: Sized {
    /// Insert a 64-bit hashed key.
    ///
    /// Idempotent: inserting the same hash twice has the same observable
    /// effect as inserting it once.
    ///
    /// # Errors
    /// Only allocation failure (and, for Taffy-Block, running past the
    /// 48-level cap) is surfaced; cuckoo-internal pressure (stash growth,
    /// upsize) is handled transparently.
    fn insert_hash(&mut self, hash: u64) -> Result<()>;

    /// Test whether `hash` may have been inserted.
    ///
    /// Never produces a false negative: if `hash` was previously inserted,
    /// this always returns `true`. May produce false positives bounded by
    /// the filter's configured fpp.
    fn find_hash(&self, hash: u64) -> bool;

    /// Current heap footprint of the filter's payload, in bytes, excluding
    /// small bookkeeping fields.
    fn size_in_bytes(&self) -> u64;
}
