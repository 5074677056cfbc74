//! Flat, parent-referencing block list → nested tree.

use std::collections::{BTreeMap, HashMap};

use blocksync_types::{BlockId, FlatBlock, MAX_TREE_DEPTH, Node};
use tracing::warn;

/// Rebuild the editor tree from stored blocks.
///
/// Siblings are ordered by `(rank, id)`. A block whose parent is missing from
/// the list, or is itself, becomes a root. Blocks only reachable through a
/// parent cycle are promoted to root as well, so every input block appears
/// exactly once (duplicated ids keep the last record). Nodes carry their
/// stored rank.
pub fn build_tree(blocks: &[FlatBlock]) -> Vec<Node> {
    let by_id: HashMap<&BlockId, &FlatBlock> = blocks.iter().map(|b| (&b.id, b)).collect();

    // parent (None = root) → children sorted by (rank, id)
    let mut groups: Groups<'_> = HashMap::new();
    for &block in by_id.values() {
        let parent = match &block.parent_id {
            Some(parent) if parent == &block.id => {
                warn!(id = %block.id, "block is its own parent, placing at root");
                None
            }
            Some(parent) if !by_id.contains_key(parent) => {
                warn!(id = %block.id, %parent, "parent not found, placing at root");
                None
            }
            other => other.as_ref(),
        };
        groups
            .entry(parent)
            .or_default()
            .insert((block.rank.as_str(), &block.id), block);
    }

    let mut roots = nest(&mut groups, None, 0);

    // Whatever is left hangs off a cycle that never reaches a root.
    while let Some(stranded) = first_stranded(&groups) {
        warn!(id = %stranded.id, "block not reachable from a root, promoting to root");
        detach(&mut groups, stranded);
        let mut node = stranded.to_node();
        node.children = nest(&mut groups, Some(&stranded.id), 1);
        roots.push(node);
    }
    roots.sort_by(|a, b| (a.rank.as_deref(), a.id.as_ref()).cmp(&(b.rank.as_deref(), b.id.as_ref())));

    roots
}

type Groups<'b> = HashMap<Option<&'b BlockId>, BTreeMap<(&'b str, &'b BlockId), &'b FlatBlock>>;

fn nest<'b>(groups: &mut Groups<'b>, parent: Option<&'b BlockId>, depth: usize) -> Vec<Node> {
    if depth >= MAX_TREE_DEPTH {
        // Left in place; the caller promotes them to root.
        if groups.contains_key(&parent) {
            warn!(parent = ?parent, "tree too deep, cutting nesting");
        }
        return Vec::new();
    }
    let Some(children) = groups.remove(&parent) else {
        return Vec::new();
    };

    children
        .into_values()
        .map(|block| {
            let mut node = block.to_node();
            node.children = nest(groups, Some(&block.id), depth + 1);
            node
        })
        .collect()
}

/// Lowest `(rank, id)` block still waiting in any group.
fn first_stranded<'b>(groups: &Groups<'b>) -> Option<&'b FlatBlock> {
    groups
        .values()
        .flat_map(|group| group.iter())
        .min_by_key(|(key, _)| **key)
        .map(|(_, block)| *block)
}

fn detach<'b>(groups: &mut Groups<'b>, block: &'b FlatBlock) {
    let key = (block.rank.as_str(), &block.id);
    groups.retain(|_, group| {
        group.remove(&key);
        !group.is_empty()
    });
}
