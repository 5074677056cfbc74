//! Shared types for blocksync.
//!
//! Two shapes of the same document live here:
//!
//! - [`Node`]: the nested tree the editing surface owns. Children are nested,
//!   ids may be missing (the engine skips those), ranks are optional hints.
//! - [`FlatBlock`]: the persisted record. One row per block, parent by id,
//!   sibling order by an opaque rank string.
//!
//! [`BlockPatch`] is the partial update sent to storage. Its structural half
//! (`parent_id` + `rank`) travels as a single [`Position`] so a block can never
//! be reparented without a rank that is valid for the new parent.

mod block;
mod content;
mod ids;
mod props;

pub use block::{BlockKind, BlockPatch, FlatBlock, Node, Position, MAX_TREE_DEPTH};
pub use content::{Content, InlineNode, TableContent, TableRow};
pub use ids::{BlockId, DocumentId};
pub use props::{PropValue, Props, PropsPolicy};
