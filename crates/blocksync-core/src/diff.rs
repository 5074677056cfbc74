//! Previous flat state + current tree → create/update/delete sets.

use std::collections::HashSet;

use blocksync_types::{BlockId, BlockPatch, FlatBlock, MAX_TREE_DEPTH, Node, PropsPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::flatten::flatten_with;
use crate::index::StateIndex;

/// Which removed blocks get an explicit delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Only the top of each removed subtree; storage cascades the rest.
    #[default]
    RootOnly,
    /// Every removed block.
    Cascade,
}

/// Operations needed to bring storage from the old state to the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDiff {
    pub to_create: Vec<FlatBlock>,
    pub to_update: Vec<BlockPatch>,
    pub to_delete: Vec<BlockId>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Total number of operations.
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Diff plus the flat state it leads to.
#[derive(Clone, Debug, Default)]
pub struct DiffPlan {
    pub diff: SyncDiff,
    /// Resolved flat state of the tree; the new baseline once pushed.
    pub next: Vec<FlatBlock>,
    /// Tree nodes left out (missing id, duplicate id, too deep).
    pub skipped: usize,
    /// Of those, nodes nested deeper than [`MAX_TREE_DEPTH`]. Their stored
    /// records are left untouched.
    pub truncated: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub props: PropsPolicy,
    pub delete_policy: DeletePolicy,
}

/// Stateless diff computation.
#[derive(Clone, Debug, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Compare the last synchronized state with the current tree.
    pub fn diff(&self, old: &StateIndex, tree: &[Node]) -> DiffPlan {
        let mut flat = flatten_with(tree, old);

        // Still in the tree, just out of reach: storage keeps them as they are.
        let kept_deep: Vec<FlatBlock> = flat
            .beyond_depth
            .iter()
            .filter_map(|id| old.get(id).cloned())
            .collect();
        if !flat.beyond_depth.is_empty() {
            warn!(
                truncated = flat.beyond_depth.len(),
                stored = kept_deep.len(),
                max_depth = MAX_TREE_DEPTH,
                "nodes nested too deep are not synced"
            );
        }

        let mut diff = SyncDiff::default();
        for block in &flat.blocks {
            match old.get(&block.id) {
                None => diff.to_create.push(block.clone()),
                Some(prev) => {
                    if let Some(patch) = self.patch_for(prev, block) {
                        trace!(id = %block.id, fields = ?patch.changed_fields(), "update");
                        diff.to_update.push(patch);
                    }
                }
            }
        }

        let next_ids: HashSet<&BlockId> = flat.blocks.iter().chain(kept_deep.iter()).map(|b| &b.id).collect();
        let removed = |id: &BlockId| old.contains(id) && !next_ids.contains(id);
        diff.to_delete = old
            .iter()
            .filter(|b| removed(&b.id))
            .filter(|b| match self.options.delete_policy {
                DeletePolicy::Cascade => true,
                DeletePolicy::RootOnly => !b.parent_id.as_ref().is_some_and(|p| removed(p)),
            })
            .map(|b| b.id.clone())
            .collect();
        diff.to_delete.sort();

        debug!(
            create = diff.to_create.len(),
            update = diff.to_update.len(),
            delete = diff.to_delete.len(),
            skipped = flat.skipped,
            "diff computed"
        );

        let truncated = flat.beyond_depth.len();
        flat.blocks.extend(kept_deep);
        DiffPlan {
            diff,
            next: flat.blocks,
            skipped: flat.skipped,
            truncated,
        }
    }

    /// Patch carrying only the fields that differ, or `None`.
    fn patch_for(&self, prev: &FlatBlock, next: &FlatBlock) -> Option<BlockPatch> {
        let mut patch = BlockPatch::new(next.id.clone());
        if prev.parent_id != next.parent_id || prev.rank != next.rank {
            patch.position = Some(next.position());
        }
        if prev.kind != next.kind {
            patch.kind = Some(next.kind.clone());
        }
        if !self.options.props.props_eq(&prev.props, &next.props) {
            patch.props = Some(next.props.clone());
        }
        if prev.content != next.content {
            patch.content = Some(next.content.clone());
        }
        (!patch.is_empty()).then_some(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_types::{BlockKind, Content, PropValue, Props};

    fn engine() -> DiffEngine {
        DiffEngine::default()
    }

    fn synced(tree: &[Node]) -> StateIndex {
        let plan = engine().diff(&StateIndex::new(), tree);
        StateIndex::from_blocks(plan.next)
    }

    fn block(id: &str, rank: &str) -> FlatBlock {
        FlatBlock::from_node(&Node::paragraph(id, id.to_uppercase()), None, rank.to_string()).unwrap()
    }

    #[test]
    fn test_insert_between_two_existing() {
        let old = StateIndex::from_blocks(vec![block("a", "a0"), block("b", "a1")]);
        let tree = vec![
            Node::paragraph("a", "A"),
            Node::paragraph("c", "C"),
            Node::paragraph("b", "B"),
        ];
        let plan = engine().diff(&old, &tree);
        assert_eq!(plan.diff.to_create.len(), 1);
        let c = &plan.diff.to_create[0];
        assert_eq!(c.id.as_str(), "c");
        assert!("a0" < c.rank.as_str() && c.rank.as_str() < "a1");
        assert!(plan.diff.to_update.is_empty());
        assert!(plan.diff.to_delete.is_empty());
    }

    #[test]
    fn test_idempotent_second_pass() {
        let tree = vec![
            Node::paragraph("a", "A").with_children(vec![Node::paragraph("a1", "nested")]),
            Node::paragraph("b", "B"),
        ];
        let old = synced(&tree);
        let plan = engine().diff(&old, &tree);
        assert!(plan.diff.is_empty(), "{:?}", plan.diff);
    }

    #[test]
    fn test_single_content_change_among_100() {
        let mut tree: Vec<Node> = (0..100).map(|i| Node::paragraph(format!("b{i:03}"), format!("text {i}"))).collect();
        let old = synced(&tree);
        tree[42].content = Content::text("edited");

        let plan = engine().diff(&old, &tree);
        assert!(plan.diff.to_create.is_empty());
        assert!(plan.diff.to_delete.is_empty());
        assert_eq!(plan.diff.to_update.len(), 1);
        let patch = &plan.diff.to_update[0];
        assert_eq!(patch.id.as_str(), "b042");
        assert_eq!(patch.changed_fields(), vec!["content"]);
    }

    #[test]
    fn test_insertion_touches_no_siblings() {
        let mut tree: Vec<Node> = (0..20).map(|i| Node::paragraph(format!("b{i}"), "")).collect();
        let old = synced(&tree);
        tree.insert(7, Node::paragraph("new", "inserted"));

        let plan = engine().diff(&old, &tree);
        assert_eq!(plan.diff.to_create.len(), 1);
        assert!(plan.diff.to_update.is_empty());
        let rank = |id: &str| plan.next.iter().find(|b| b.id.as_str() == id).unwrap().rank.clone();
        assert!(rank("b6") < rank("new") && rank("new") < rank("b7"));
    }

    #[test]
    fn test_reparent_emits_position() {
        let mut tree = vec![
            Node::paragraph("a", "A"),
            Node::paragraph("b", "B"),
            Node::paragraph("c", "C"),
        ];
        let old = synced(&tree);
        let c = tree.remove(2);
        tree[0].children.push(c);

        let plan = engine().diff(&old, &tree);
        assert!(plan.diff.to_create.is_empty());
        assert!(plan.diff.to_delete.is_empty());
        assert_eq!(plan.diff.to_update.len(), 1);
        let patch = &plan.diff.to_update[0];
        assert_eq!(patch.id.as_str(), "c");
        assert_eq!(patch.changed_fields(), vec!["parentId", "rank"]);
        let position = patch.position.as_ref().unwrap();
        assert_eq!(position.parent_id, Some(BlockId::from("a")));
        assert!(!position.rank.is_empty());
    }

    #[test]
    fn test_move_within_siblings_rewrites_one_rank() {
        let mut tree: Vec<Node> = (0..10).map(|i| Node::paragraph(format!("b{i}"), "")).collect();
        let old = synced(&tree);
        let last = tree.pop().unwrap();
        tree.insert(0, last);

        let plan = engine().diff(&old, &tree);
        assert_eq!(plan.diff.to_update.len(), 1);
        assert_eq!(plan.diff.to_update[0].id.as_str(), "b9");
        assert!(plan.diff.to_update[0].touches_structure());
    }

    #[test]
    fn test_root_only_delete_of_subtree() {
        let tree = vec![
            Node::new("list", BlockKind::BulletListItem).with_children(vec![
                Node::paragraph("x", "").with_children(vec![Node::paragraph("y", "")]),
                Node::paragraph("z", ""),
            ]),
            Node::paragraph("keep", ""),
        ];
        let old = synced(&tree);
        let after = vec![Node::paragraph("keep", "")];

        let plan = engine().diff(&old, &after);
        assert_eq!(plan.diff.to_delete, vec![BlockId::from("list")]);

        let cascade = DiffEngine::new(DiffOptions {
            delete_policy: DeletePolicy::Cascade,
            ..DiffOptions::default()
        });
        let plan = cascade.diff(&old, &after);
        assert_eq!(plan.diff.to_delete.len(), 4);
    }

    #[test]
    fn test_child_moved_out_of_deleted_container_survives() {
        let tree = vec![Node::new("cols", BlockKind::ColumnList).with_children(vec![Node::paragraph("p", "")])];
        let old = synced(&tree);
        let after = vec![Node::paragraph("p", "")];

        let plan = engine().diff(&old, &after);
        assert_eq!(plan.diff.to_delete, vec![BlockId::from("cols")]);
        assert_eq!(plan.diff.to_update.len(), 1);
        assert_eq!(plan.diff.to_update[0].position.as_ref().unwrap().parent_id, None);

        let mut storage = old.clone();
        storage.apply_diff(&plan.diff);
        assert!(storage.contains(&BlockId::from("p")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_default_props_are_not_a_change() {
        let tree = vec![Node::paragraph("a", "A")];
        let old = synced(&tree);

        let mut props = Props::new();
        props.insert("textColor".into(), PropValue::from("default"));
        props.insert("textAlignment".into(), PropValue::from("left"));
        let tree = vec![Node::paragraph("a", "A").with_props(props)];
        assert!(engine().diff(&old, &tree).diff.is_empty());

        let mut props = Props::new();
        props.insert("textColor".into(), PropValue::from("red"));
        let tree = vec![Node::paragraph("a", "A").with_props(props)];
        let plan = engine().diff(&old, &tree);
        assert_eq!(plan.diff.to_update[0].changed_fields(), vec!["props"]);
    }

    #[test]
    fn test_kind_change_is_literal() {
        let old = synced(&[Node::paragraph("a", "A")]);
        let tree = vec![Node::new("a", BlockKind::Heading).with_content(Content::text("A"))];
        let plan = engine().diff(&old, &tree);
        assert_eq!(plan.diff.to_update[0].changed_fields(), vec!["type"]);
    }

    #[test]
    fn test_duplicates_and_missing_ids_do_not_abort() {
        let old = StateIndex::new();
        let mut anonymous = Node::paragraph("tmp", "");
        anonymous.id = None;
        let tree = vec![Node::paragraph("a", "1"), anonymous, Node::paragraph("a", "2"), Node::paragraph("b", "")];
        let plan = engine().diff(&old, &tree);
        let ids: Vec<&str> = plan.diff.to_create.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(plan.diff.to_create[0].content, Content::text("1"));
        assert_eq!(plan.skipped, 2);
    }

    #[test]
    fn test_parent_losing_its_id_keeps_tracked_children() {
        let tree = vec![
            Node::paragraph("p", "P").with_children(vec![Node::paragraph("c1", "1"), Node::paragraph("c2", "2")]),
            Node::paragraph("q", "Q"),
        ];
        let old = synced(&tree);

        let mut edited = tree.clone();
        edited[0].id = None;
        let plan = engine().diff(&old, &edited);

        assert_eq!(plan.skipped, 1);
        assert!(plan.diff.to_create.is_empty());
        assert_eq!(plan.diff.to_delete, vec![BlockId::from("p")]);
        let moved: Vec<&str> = plan.diff.to_update.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(moved, vec!["c1", "c2"]);
        assert!(plan.diff.to_update.iter().all(|p| p.position.as_ref().unwrap().parent_id.is_none()));

        // Storage applies updates before the cascading delete: the children survive.
        let mut storage = old.clone();
        storage.apply_diff(&plan.diff);
        let mut ids: Vec<&str> = storage.ids().map(BlockId::as_str).collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "c2", "q"]);
    }

    #[test]
    fn test_stored_blocks_beyond_max_depth_are_not_deleted() {
        let depth = MAX_TREE_DEPTH + 2;
        let mut stored = Vec::with_capacity(depth);
        for i in 0..depth {
            let parent = (i > 0).then(|| BlockId::from(format!("n{}", i - 1)));
            stored.push(FlatBlock::from_node(&Node::paragraph(format!("n{i}"), ""), parent, "V".into()).unwrap());
        }
        let old = StateIndex::from_blocks(stored);

        let mut node = Node::paragraph(format!("n{}", depth - 1), "");
        for i in (0..depth - 1).rev() {
            node = Node::paragraph(format!("n{i}"), "").with_children(vec![node]);
        }
        let plan = engine().diff(&old, std::slice::from_ref(&node));

        assert!(plan.diff.is_empty(), "{:?}", plan.diff.to_delete);
        assert_eq!(plan.truncated, 2);
        // The untouched records stay part of the next baseline.
        assert_eq!(plan.next.len(), depth);
    }

    #[test]
    fn test_remote_tree_with_stored_ranks_is_clean() {
        let old = StateIndex::from_blocks(vec![block("a", "a0"), block("b", "a1")]);
        let tree = crate::build_tree(&old.to_blocks());
        assert!(engine().diff(&old, &tree).diff.is_empty());
    }
}
