//! Nested tree → flat, rank-ordered block records.
//!
//! Each children list is ranked on its own. Within a list, the ranks that are
//! already known (from the last synchronized state, else the node's own rank
//! hint) are kept if they form the longest strictly increasing run; every
//! other node gets a fresh rank between its kept neighbours.
//!
//! A node without an id cannot be tracked, but its children can: they are
//! ranked in its place among its siblings. Subtrees below
//! [`MAX_TREE_DEPTH`] are not emitted; their ids are reported so a diff does
//! not delete what it could not see.

use std::collections::{HashMap, HashSet};

use blocksync_types::{BlockId, FlatBlock, MAX_TREE_DEPTH, Node};
use tracing::warn;

use crate::index::StateIndex;
use crate::rank;

/// Source of already-assigned ranks.
pub trait KnownRanks {
    /// Rank of `id` if it is known under `parent`.
    fn known_rank(&self, id: &BlockId, parent: Option<&BlockId>) -> Option<&str>;
}

/// Plain id → rank map. The parent is not checked.
impl KnownRanks for HashMap<BlockId, String> {
    fn known_rank(&self, id: &BlockId, _parent: Option<&BlockId>) -> Option<&str> {
        self.get(id).map(String::as_str)
    }
}

/// A stored rank is only reused while the block stays under the same parent.
impl KnownRanks for StateIndex {
    fn known_rank(&self, id: &BlockId, parent: Option<&BlockId>) -> Option<&str> {
        self.get(id)
            .filter(|block| block.parent_id.as_ref() == parent)
            .map(|block| block.rank.as_str())
    }
}

/// Result of flattening a tree.
#[derive(Clone, Debug, Default)]
pub struct Flattened {
    /// Records in depth-first order, parents before children.
    pub blocks: Vec<FlatBlock>,
    /// Nodes left out: missing id, duplicate id, or nested too deep.
    pub skipped: usize,
    /// Ids nested deeper than [`MAX_TREE_DEPTH`]. They are not emitted, and
    /// callers must not treat them as removed.
    pub beyond_depth: Vec<BlockId>,
}

/// Flatten `tree`, reusing ranks from `existing` where they still fit.
pub fn flatten(tree: &[Node], existing: &HashMap<BlockId, String>) -> Vec<FlatBlock> {
    flatten_with(tree, existing).blocks
}

/// Flatten `tree` against any rank source.
pub fn flatten_with<K: KnownRanks + ?Sized>(tree: &[Node], known: &K) -> Flattened {
    let mut acceptance = Acceptance::default();
    let roots = acceptance.scan(tree, 0);

    let mut walker = Walker {
        known,
        blocks: Vec::new(),
    };
    walker.walk(&roots, None);

    Flattened {
        blocks: walker.blocks,
        skipped: acceptance.skipped,
        beyond_depth: acceptance.beyond_depth,
    }
}

/// Final rank for every slot of one sibling list.
///
/// `candidates[i]` is the rank slot `i` would like to keep. The longest
/// strictly increasing subsequence of candidates is kept verbatim; the other
/// slots are filled in runs between their kept neighbours.
pub fn resolve_ranks(candidates: &[Option<&str>]) -> Vec<String> {
    let candidates: Vec<Option<&str>> = candidates
        .iter()
        .map(|c| c.filter(|r| !r.is_empty()))
        .collect();
    let mut kept = longest_increasing(&candidates);
    let n = candidates.len();
    let mut out: Vec<String> = Vec::with_capacity(n);

    let mut i = 0;
    while i < n {
        if kept[i] {
            if let Some(rank) = candidates[i] {
                out.push(rank.to_string());
            }
            i += 1;
            continue;
        }

        let prev = out.last().map(String::as_str);
        let mut end = next_kept(&kept, i);
        // A kept neighbour with no room below it (legacy "a" then "a0")
        // joins the run instead.
        while end < n && !rank::has_room(prev, candidates[end]) {
            kept[end] = false;
            end = next_kept(&kept, end + 1);
        }

        let next = if end < n { candidates[end] } else { None };
        out.extend(rank::allocate_n(prev, next, end - i));
        i = end;
    }
    out
}

fn next_kept(kept: &[bool], from: usize) -> usize {
    (from..kept.len()).find(|&j| kept[j]).unwrap_or(kept.len())
}

/// Membership mask of one longest strictly increasing subsequence.
///
/// `None` entries never take part. O(n log n) patience sort.
fn longest_increasing(ranks: &[Option<&str>]) -> Vec<bool> {
    // tails[k]: (index, rank) ending the best run of length k + 1 found so far.
    let mut tails: Vec<(usize, &str)> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; ranks.len()];

    for (i, rank) in ranks.iter().enumerate() {
        let Some(rank) = *rank else { continue };
        let pos = tails.partition_point(|&(_, tail)| tail < rank);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1].0);
        }
        if pos == tails.len() {
            tails.push((i, rank));
        } else if rank < tails[pos].1 {
            // Equal ranks keep the earlier slot.
            tails[pos] = (i, rank);
        }
    }

    let mut kept = vec![false; ranks.len()];
    let mut cursor = tails.last().map(|&(i, _)| i);
    while let Some(i) = cursor {
        kept[i] = true;
        cursor = prev[i];
    }
    kept
}

// ============================================================================
// Traversal
// ============================================================================

/// A node taking part in ranking, with its accepted children.
struct Accepted<'t> {
    node: &'t Node,
    id: &'t BlockId,
    children: Vec<Accepted<'t>>,
}

/// First-occurrence pass: decides which nodes take part before ranking.
#[derive(Default)]
struct Acceptance<'t> {
    seen: HashSet<&'t BlockId>,
    skipped: usize,
    beyond_depth: Vec<BlockId>,
}

impl<'t> Acceptance<'t> {
    fn scan(&mut self, siblings: &'t [Node], depth: usize) -> Vec<Accepted<'t>> {
        let mut out = Vec::with_capacity(siblings.len());
        self.scan_into(siblings, depth, &mut out);
        out
    }

    /// Children of a node without an id take its place in `out`.
    fn scan_into(&mut self, siblings: &'t [Node], depth: usize, out: &mut Vec<Accepted<'t>>) {
        for node in siblings {
            let Some(id) = node.id.as_ref().filter(|id| !id.is_empty()) else {
                warn!(kind = %node.kind, lifted = node.children.len(), "node without id, lifting its children");
                self.skipped += 1;
                if depth + 1 >= MAX_TREE_DEPTH {
                    self.truncate(&node.children);
                } else {
                    self.scan_into(&node.children, depth + 1, out);
                }
                continue;
            };
            if !self.seen.insert(id) {
                warn!(%id, dropped = node.subtree_len(), "duplicate block id, keeping first occurrence");
                self.skipped += node.subtree_len();
                continue;
            }

            let children = if node.children.is_empty() {
                Vec::new()
            } else if depth + 1 >= MAX_TREE_DEPTH {
                warn!(%id, depth, dropped = node.subtree_len() - 1, "tree too deep, truncating children");
                self.truncate(&node.children);
                Vec::new()
            } else {
                self.scan(&node.children, depth + 1)
            };
            out.push(Accepted { node, id, children });
        }
    }

    fn truncate(&mut self, nodes: &'t [Node]) {
        let mut stack: Vec<&Node> = nodes.iter().collect();
        while let Some(node) = stack.pop() {
            self.skipped += 1;
            if let Some(id) = node.id.as_ref().filter(|id| !id.is_empty()) {
                self.beyond_depth.push(id.clone());
            }
            stack.extend(&node.children);
        }
    }
}

struct Walker<'a, K: ?Sized> {
    known: &'a K,
    blocks: Vec<FlatBlock>,
}

impl<K: KnownRanks + ?Sized> Walker<'_, K> {
    fn walk(&mut self, siblings: &[Accepted<'_>], parent: Option<&BlockId>) {
        let candidates: Vec<Option<&str>> = siblings
            .iter()
            .map(|entry| self.known.known_rank(entry.id, parent).or(entry.node.rank.as_deref()))
            .collect();
        let ranks = resolve_ranks(&candidates);

        for (entry, rank) in siblings.iter().zip(ranks) {
            let Some(block) = FlatBlock::from_node(entry.node, parent.cloned(), rank) else {
                continue;
            };
            self.blocks.push(block);
            if !entry.children.is_empty() {
                self.walk(&entry.children, Some(entry.id));
            }
        }
    }
}
