//! Approximate set-membership filters with one-sided error.
//!
//! Four families, trading construction simplicity for the ability to grow
//! online as the working set size becomes clear: [`Block`], [`TaffyBlock`],
//! [`TaffyCuckoo`], and [`MinimalTaffyCuckoo`], plus [`FrozenTaffyCuckoo`],
//! a read-only snapshot of the latter two. See [`common::Filter`] for the
//! operations shared across all of them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod common;
pub mod membership;

pub use common::{FilterError, Filter, Result};
pub use membership::{Block, FrozenTaffyCuckoo, MinimalTaffyCuckoo, TaffyBlock, TaffyCuckoo};
