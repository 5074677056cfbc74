//! Per-document synchronization state, independent of any runtime.
//!
//! [`SyncedDocument`] owns the last synchronized baseline and the echo guard.
//! The actor drives it; tests can drive it directly.
//!
//! # Baseline vs. pending echoes
//!
//! The baseline only moves on a fully successful push, on load, or when an
//! external snapshot is accepted. A push that fails halfway still leaves its
//! intermediate states pending in the echo guard, so storage reflecting those
//! back is not mistaken for a remote change. Earlier baselines are forgotten:
//! a remote revert to one of them is rebuilt like any other external change.

use blocksync_core::{DiffEngine, DiffPlan, StateIndex, SyncDiff, build_tree};
use blocksync_types::{DocumentId, FlatBlock, Node};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::echo::{EchoGuard, Inbound};

/// Counts of one completed pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Tree nodes left out (missing or duplicate id, excessive depth).
    pub skipped: usize,
    /// Of those, nodes below the depth limit. Their stored records are kept
    /// as they are and never updated.
    pub truncated: usize,
}

impl PassReport {
    pub fn from_plan(plan: &DiffPlan) -> Self {
        Self {
            created: plan.diff.to_create.len(),
            updated: plan.diff.to_update.len(),
            deleted: plan.diff.to_delete.len(),
            skipped: plan.skipped,
            truncated: plan.truncated,
        }
    }
}

/// What to do with an inbound storage snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEffect {
    /// Our own write; nothing to do.
    Echo,
    /// External change; replace the editor tree with this.
    Rebuild(Vec<Node>),
}

pub struct SyncedDocument {
    scope: DocumentId,
    baseline: StateIndex,
    echo: EchoGuard,
    engine: DiffEngine,
    version: u64,
}

impl SyncedDocument {
    pub fn new(scope: DocumentId, config: &SyncConfig) -> Self {
        Self {
            scope,
            baseline: StateIndex::new(),
            echo: EchoGuard::new(config.echo_history, config.props_policy()),
            engine: config.diff_engine(),
            version: 0,
        }
    }

    pub fn scope(&self) -> &DocumentId {
        &self.scope
    }

    pub fn baseline(&self) -> &StateIndex {
        &self.baseline
    }

    pub fn echo(&self) -> &EchoGuard {
        &self.echo
    }

    /// Bumped every time the baseline changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adopt the stored state and return the tree to show.
    pub fn load(&mut self, blocks: Vec<FlatBlock>) -> Vec<Node> {
        info!(scope = %self.scope, blocks = blocks.len(), "loaded");
        let tree = build_tree(&blocks);
        self.echo.mark_synced(&blocks);
        self.set_baseline(blocks);
        tree
    }

    /// Diff the current tree against the baseline.
    pub fn plan(&self, tree: &[Node]) -> DiffPlan {
        self.engine.diff(&self.baseline, tree)
    }

    /// About to push `diff`: remember the states storage will go through.
    pub fn record_attempt(&mut self, diff: &SyncDiff) {
        self.echo.record_attempt(&self.baseline, diff);
    }

    /// `next` was pushed successfully.
    pub fn commit(&mut self, next: Vec<FlatBlock>) {
        self.echo.mark_synced(&next);
        self.set_baseline(next);
    }

    /// Drop `blocks` if it is our own write. Must be checked for a held
    /// snapshot before the next push, which forgets the current echoes.
    pub fn discard_echo(&mut self, blocks: &[FlatBlock]) -> bool {
        self.echo.ignore_echo(blocks)
    }

    pub fn receive_snapshot(&mut self, blocks: Vec<FlatBlock>) -> RemoteEffect {
        match self.echo.classify(&blocks) {
            Inbound::Echo => RemoteEffect::Echo,
            Inbound::External => {
                debug!(scope = %self.scope, blocks = blocks.len(), "external change accepted");
                let tree = build_tree(&blocks);
                self.set_baseline(blocks);
                RemoteEffect::Rebuild(tree)
            }
        }
    }

    fn set_baseline(&mut self, blocks: Vec<FlatBlock>) {
        self.baseline = StateIndex::from_blocks(blocks);
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_types::{BlockId, Content};

    fn test_doc() -> SyncedDocument {
        SyncedDocument::new(DocumentId::from("doc"), &SyncConfig::default())
    }

    #[test]
    fn test_load_builds_tree_and_baseline() {
        let mut doc = test_doc();
        let blocks = vec![
            FlatBlock::from_node(&Node::paragraph("b", "B"), None, "l".into()).unwrap(),
            FlatBlock::from_node(&Node::paragraph("a", "A"), None, "V".into()).unwrap(),
        ];
        let tree = doc.load(blocks);
        assert_eq!(tree[0].id, Some(BlockId::from("a")));
        assert_eq!(doc.baseline().len(), 2);
        assert_eq!(doc.version(), 1);
        // Unchanged tree produces nothing to push.
        assert!(doc.plan(&tree).diff.is_empty());
    }

    #[test]
    fn test_commit_then_echo() {
        let mut doc = test_doc();
        doc.load(Vec::new());
        let tree = vec![Node::paragraph("a", "A")];
        let plan = doc.plan(&tree);
        assert_eq!(PassReport::from_plan(&plan).created, 1);

        doc.record_attempt(&plan.diff);
        doc.commit(plan.next.clone());
        assert_eq!(doc.receive_snapshot(plan.next), RemoteEffect::Echo);
        assert!(doc.plan(&tree).diff.is_empty());
    }

    #[test]
    fn test_external_snapshot_rebuilds_and_resets_baseline() {
        let mut doc = test_doc();
        let tree = vec![Node::paragraph("a", "A")];
        let plan = doc.plan(&tree);
        doc.commit(plan.next.clone());

        let mut remote = plan.next.clone();
        remote[0].content = Content::text("theirs");
        let RemoteEffect::Rebuild(rebuilt) = doc.receive_snapshot(remote) else {
            panic!("expected rebuild");
        };
        assert_eq!(rebuilt[0].content, Content::text("theirs"));
        // The rebuilt tree is in sync with the new baseline.
        assert!(doc.plan(&rebuilt).diff.is_empty());
        // Our stale tree would now push our version back.
        assert_eq!(doc.plan(&tree).diff.to_update.len(), 1);
    }

    #[test]
    fn test_failed_push_keeps_baseline() {
        let mut doc = test_doc();
        doc.load(Vec::new());
        let tree = vec![Node::paragraph("a", "A")];
        let plan = doc.plan(&tree);
        doc.record_attempt(&plan.diff);
        // No commit: the next plan re-derives the create.
        assert_eq!(doc.plan(&tree).diff.to_create.len(), 1);
        // Storage reflecting the partial write back is still an echo.
        assert_eq!(doc.receive_snapshot(plan.next), RemoteEffect::Echo);
    }

    fn commit_tree(doc: &mut SyncedDocument, tree: &[Node]) -> Vec<FlatBlock> {
        let plan = doc.plan(tree);
        doc.record_attempt(&plan.diff);
        doc.commit(plan.next.clone());
        plan.next
    }

    #[test]
    fn test_remote_revert_to_earlier_state_is_rebuilt() {
        let mut doc = test_doc();
        doc.load(Vec::new());
        let s1 = commit_tree(&mut doc, &[Node::paragraph("a", "v1")]);
        let s2 = commit_tree(&mut doc, &[Node::paragraph("a", "v2")]);
        assert_eq!(doc.receive_snapshot(s2), RemoteEffect::Echo);

        // Another client restores v1.
        let RemoteEffect::Rebuild(rebuilt) = doc.receive_snapshot(s1) else {
            panic!("revert dropped as an echo");
        };
        assert_eq!(rebuilt[0].content, Content::text("v1"));
        let a = doc.baseline().get(&BlockId::from("a")).unwrap();
        assert_eq!(a.content, Content::text("v1"));
    }

    #[test]
    fn test_remote_revert_before_our_echo_is_rebuilt() {
        let mut doc = test_doc();
        doc.load(Vec::new());
        let s1 = commit_tree(&mut doc, &[Node::paragraph("a", "v1")]);
        commit_tree(&mut doc, &[Node::paragraph("a", "v2")]);

        // No snapshot seen yet; S1 is not ours any more.
        assert!(matches!(doc.receive_snapshot(s1), RemoteEffect::Rebuild(_)));
        let a = doc.baseline().get(&BlockId::from("a")).unwrap();
        assert_eq!(a.content, Content::text("v1"));
        assert_eq!(doc.echo().pending(), 0);
    }

    #[test]
    fn test_held_echo_is_discarded_before_next_push() {
        let mut doc = test_doc();
        doc.load(Vec::new());
        let s1 = commit_tree(&mut doc, &[Node::paragraph("a", "v1")]);
        assert!(doc.discard_echo(&s1));
        commit_tree(&mut doc, &[Node::paragraph("a", "v2")]);

        let external = edited_elsewhere(&s1);
        assert!(!doc.discard_echo(&external));
        assert_eq!(doc.version(), 3);
        assert_eq!(doc.echo().echoes_ignored(), 1);
    }

    fn edited_elsewhere(blocks: &[FlatBlock]) -> Vec<FlatBlock> {
        let mut blocks = blocks.to_vec();
        blocks[0].content = Content::text("v0");
        blocks
    }
}
