//! Synchronization engine core for blocksync.
//!
//! Pure, synchronous building blocks. Nothing here performs I/O or keeps state
//! between calls; the async driver lives in `blocksync-client`.
//!
//! # Pipeline
//!
//! ```text
//!   editor tree ──flatten──▶ FlatBlock list ──┐
//!                                             ├──diff──▶ { create, update, delete }
//!   last synced blocks ──▶ StateIndex ────────┘
//!
//!   stored blocks ──build_tree──▶ editor tree
//! ```
//!
//! # Ordering
//!
//! Sibling order is a base-62 fractional index ([`rank::allocate`]). A new or
//! moved block only ever rewrites its own rank; siblings keep theirs. Which
//! ranks survive is decided per sibling list by a longest increasing
//! subsequence, so a move rewrites exactly one rank no matter where it lands.

mod builder;
mod diff;
mod flatten;
mod index;
pub mod rank;

pub use builder::build_tree;
pub use diff::{DeletePolicy, DiffEngine, DiffOptions, DiffPlan, SyncDiff};
pub use flatten::{Flattened, KnownRanks, flatten, flatten_with, resolve_ranks};
pub use index::StateIndex;
