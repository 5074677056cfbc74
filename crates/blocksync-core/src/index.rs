//! Id-keyed index over a flat block list.
//!
//! Built from the last synchronized state at the start of a pass so the diff
//! can look blocks up in O(1). It also knows how to apply a diff the way
//! storage does, which the echo guard uses to predict what storage will look
//! like after each phase of a push and the in-memory gateway uses as its
//! backing store.

use std::collections::{HashMap, HashSet};

use blocksync_types::{BlockId, BlockPatch, FlatBlock};

use crate::diff::SyncDiff;

/// Blocks of one scope keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateIndex {
    entries: HashMap<BlockId, FlatBlock>,
}

impl StateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `blocks`. A repeated id replaces the earlier record.
    pub fn from_blocks(blocks: impl IntoIterator<Item = FlatBlock>) -> Self {
        let mut index = Self::new();
        for block in blocks {
            index.insert(block);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &BlockId) -> Option<&FlatBlock> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn rank_of(&self, id: &BlockId) -> Option<&str> {
        self.entries.get(id).map(|b| b.rank.as_str())
    }

    /// Parent of `id`: `None` if unknown, `Some(None)` for a root block.
    pub fn parent_of(&self, id: &BlockId) -> Option<Option<&BlockId>> {
        self.entries.get(id).map(|b| b.parent_id.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &BlockId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlatBlock> {
        self.entries.values()
    }

    /// Insert or replace by id (create is idempotent by id).
    pub fn insert(&mut self, block: FlatBlock) -> Option<FlatBlock> {
        self.entries.insert(block.id.clone(), block)
    }

    /// Apply a partial patch. Unknown ids are ignored; returns whether a
    /// block was touched.
    pub fn apply_patch(&mut self, patch: &BlockPatch) -> bool {
        match self.entries.get_mut(&patch.id) {
            Some(block) => patch.apply_to(block),
            None => false,
        }
    }

    pub fn remove(&mut self, id: &BlockId) -> Option<FlatBlock> {
        self.entries.remove(id)
    }

    /// Remove `id` and every block whose parent chain leads to it.
    ///
    /// Returns the number of blocks removed. Missing ids are a no-op.
    pub fn remove_subtree(&mut self, id: &BlockId) -> usize {
        if !self.entries.contains_key(id) {
            return 0;
        }

        let mut children: HashMap<&BlockId, Vec<&BlockId>> = HashMap::new();
        for block in self.entries.values() {
            if let Some(parent) = &block.parent_id {
                children.entry(parent).or_default().push(&block.id);
            }
        }

        let mut doomed: HashSet<BlockId> = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            // The visited check also stops on parent cycles.
            if !doomed.insert(current.clone()) {
                continue;
            }
            if let Some(kids) = children.get(current) {
                stack.extend(kids.iter().copied());
            }
        }

        for id in &doomed {
            self.entries.remove(id);
        }
        doomed.len()
    }

    /// Storage state after a bulk create.
    pub fn apply_creates(&mut self, blocks: &[FlatBlock]) {
        for block in blocks {
            self.insert(block.clone());
        }
    }

    /// Storage state after a bulk update.
    pub fn apply_updates(&mut self, patches: &[BlockPatch]) {
        for patch in patches {
            self.apply_patch(patch);
        }
    }

    /// Storage state after a bulk delete (cascading to descendants).
    pub fn apply_deletes(&mut self, ids: &[BlockId]) {
        for id in ids {
            self.remove_subtree(id);
        }
    }

    /// Apply a whole diff in push order: create, update, delete.
    pub fn apply_diff(&mut self, diff: &SyncDiff) {
        self.apply_creates(&diff.to_create);
        self.apply_updates(&diff.to_update);
        self.apply_deletes(&diff.to_delete);
    }

    /// Canonical block list, sorted by id.
    pub fn to_blocks(&self) -> Vec<FlatBlock> {
        let mut blocks: Vec<FlatBlock> = self.entries.values().cloned().collect();
        blocks.sort_by(|a, b| a.id.cmp(&b.id));
        blocks
    }
}

impl FromIterator<FlatBlock> for StateIndex {
    fn from_iter<I: IntoIterator<Item = FlatBlock>>(iter: I) -> Self {
        Self::from_blocks(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_types::{BlockKind, Content, Position, Props};

    fn block(id: &str, parent: Option<&str>, rank: &str) -> FlatBlock {
        FlatBlock {
            id: BlockId::from(id),
            parent_id: parent.map(BlockId::from),
            kind: BlockKind::Paragraph,
            props: Props::new(),
            content: Content::Empty,
            rank: rank.to_string(),
        }
    }

    fn test_index() -> StateIndex {
        StateIndex::from_blocks(vec![
            block("root", None, "V"),
            block("child", Some("root"), "V"),
            block("grandchild", Some("child"), "V"),
            block("sibling", None, "l"),
        ])
    }

    #[test]
    fn test_lookup() {
        let index = test_index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.rank_of(&BlockId::from("sibling")), Some("l"));
        assert_eq!(index.parent_of(&BlockId::from("root")), Some(None));
        assert_eq!(
            index.parent_of(&BlockId::from("child")),
            Some(Some(&BlockId::from("root")))
        );
        assert_eq!(index.parent_of(&BlockId::from("nope")), None);
    }

    #[test]
    fn test_remove_subtree_cascades() {
        let mut index = test_index();
        assert_eq!(index.remove_subtree(&BlockId::from("root")), 3);
        assert_eq!(index.len(), 1);
        assert!(index.contains(&BlockId::from("sibling")));
        assert_eq!(index.remove_subtree(&BlockId::from("root")), 0);
    }

    #[test]
    fn test_remove_subtree_survives_cycles() {
        let mut index = StateIndex::from_blocks(vec![block("a", Some("b"), "V"), block("b", Some("a"), "V")]);
        assert_eq!(index.remove_subtree(&BlockId::from("a")), 2);
        assert!(index.is_empty());
    }

    #[test]
    fn test_apply_diff_in_push_order() {
        let mut index = test_index();
        let mut moved = BlockPatch::new(BlockId::from("grandchild"));
        moved.position = Some(Position {
            parent_id: None,
            rank: "t".into(),
        });
        let diff = SyncDiff {
            to_create: vec![block("new", Some("sibling"), "V")],
            to_update: vec![moved],
            to_delete: vec![BlockId::from("root")],
        };
        index.apply_diff(&diff);

        // grandchild moved out before its old ancestor was deleted.
        let ids: Vec<String> = index.to_blocks().into_iter().map(|b| b.id.into_inner()).collect();
        assert_eq!(ids, vec!["grandchild", "new", "sibling"]);
        assert_eq!(index.rank_of(&BlockId::from("grandchild")), Some("t"));
    }

    #[test]
    fn test_patch_unknown_id_is_ignored() {
        let mut index = test_index();
        assert!(!index.apply_patch(&BlockPatch::new(BlockId::from("ghost"))));
        assert_eq!(index, test_index());
    }
}
