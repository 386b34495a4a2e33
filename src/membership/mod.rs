//! Approximate set-membership filters.
//!
//! Four families, increasing in sophistication: [`Block`] is the constant-sized
//! building block; [`TaffyBlock`] stacks Blocks to grow online; [`TaffyCuckoo`]
//! and [`MinimalTaffyCuckoo`] are quotient-style cuckoo filters that grow by
//! doubling (the Minimal variant incrementally, via a cursor over 32 internal
//! levels). [`FrozenTaffyCuckoo`] is a read-only, fingerprint-only snapshot of
//! a Taffy-Cuckoo filter.

pub mod block;
pub mod minimal_taffy_cuckoo;
pub mod taffy_block;
pub mod taffy_cuckoo;

pub use block::Block;
pub use minimal_taffy_cuckoo::MinimalTaffyCuckoo;
pub use taffy_block::TaffyBlock;
pub use taffy_cuckoo::{FrozenTaffyCuckoo, TaffyCuckoo};
