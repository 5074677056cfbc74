//! Recognizing our own writes when storage reflects them back.
//!
//! Storage publishes its full state after each bulk call. Without a guard,
//! every push would come back as a "remote change", be rebuilt into the
//! editor, and possibly be pushed again.
//!
//! Snapshots are compared by SHA-256 over a canonical serialization: blocks
//! sorted by id, props normalized. A push is three separate calls (create,
//! update, delete), so subscribers can observe up to three states per pass.
//! The guard predicts each of them from the baseline and the diff and holds
//! those digests as pending echoes.
//!
//! Only two things count as an echo: the last synced state, and a pending
//! state of the latest push. Pending states are dropped when the next push
//! starts, when storage reports the synced state, or when an external change
//! is accepted. Older baselines are never remembered, so a remote revert to
//! one of them is an external change.

use std::collections::VecDeque;
use std::fmt;

use blocksync_core::{StateIndex, SyncDiff};
use blocksync_types::{BlockId, BlockKind, Content, FlatBlock, Props, PropsPolicy};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

/// SHA-256 of a canonical block list.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotDigest([u8; 32]);

impl SnapshotDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SnapshotDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SnapshotDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotDigest({})", &self.to_hex()[..12])
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRecord<'a> {
    id: &'a BlockId,
    parent_id: Option<&'a BlockId>,
    #[serde(rename = "type")]
    kind: &'a BlockKind,
    props: Props,
    content: &'a Content,
    rank: &'a str,
}

/// Digest of `blocks` in any order.
pub fn digest<'a>(blocks: impl IntoIterator<Item = &'a FlatBlock>, policy: &PropsPolicy) -> SnapshotDigest {
    let mut sorted: Vec<&FlatBlock> = blocks.into_iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = Sha256::new();
    for block in sorted {
        let record = CanonicalRecord {
            id: &block.id,
            parent_id: block.parent_id.as_ref(),
            kind: &block.kind,
            props: policy.normalize(&block.props),
            content: &block.content,
            rank: &block.rank,
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => {
                warn!(id = %block.id, error = %e, "block not serializable, digesting id only");
                hasher.update(block.id.as_str().as_bytes());
            }
        }
        hasher.update(b"\n");
    }
    SnapshotDigest(hasher.finalize().into())
}

/// Verdict on an inbound snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Our own write reflected back; ignore.
    Echo,
    /// Someone else changed storage; rebuild from it.
    External,
}

pub struct EchoGuard {
    policy: PropsPolicy,
    last_synced: Option<SnapshotDigest>,
    /// Predicted states of the latest push, not yet confirmed by storage.
    pending: VecDeque<SnapshotDigest>,
    capacity: usize,
    echoes_ignored: u64,
}

impl EchoGuard {
    pub fn new(capacity: usize, policy: PropsPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            policy,
            last_synced: None,
            pending: VecDeque::with_capacity(capacity),
            capacity,
            echoes_ignored: 0,
        }
    }

    pub fn digest(&self, blocks: &[FlatBlock]) -> SnapshotDigest {
        digest(blocks, &self.policy)
    }

    /// Digest of the state storage is known to hold.
    pub fn last_synced(&self) -> Option<SnapshotDigest> {
        self.last_synced
    }

    pub fn echoes_ignored(&self) -> u64 {
        self.echoes_ignored
    }

    /// Predicted echoes not yet confirmed by storage.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Storage is known to hold `blocks` (load, or a successful push).
    ///
    /// Pending states stay: storage may still report them on its way here.
    pub fn mark_synced(&mut self, blocks: &[FlatBlock]) {
        let d = self.digest(blocks);
        trace!(digest = ?d, "synced");
        self.last_synced = Some(d);
    }

    /// Remember every state storage passes through while applying `diff`
    /// on top of `baseline`. Replaces what an earlier push left pending.
    pub fn record_attempt(&mut self, baseline: &StateIndex, diff: &SyncDiff) {
        self.pending.clear();
        let mut state = baseline.clone();
        if !diff.to_create.is_empty() {
            state.apply_creates(&diff.to_create);
            self.predict(digest(state.iter(), &self.policy));
        }
        if !diff.to_update.is_empty() {
            state.apply_updates(&diff.to_update);
            self.predict(digest(state.iter(), &self.policy));
        }
        if !diff.to_delete.is_empty() {
            state.apply_deletes(&diff.to_delete);
            self.predict(digest(state.iter(), &self.policy));
        }
    }

    /// Classify an inbound snapshot. External snapshots become the new
    /// synced state.
    pub fn classify(&mut self, incoming: &[FlatBlock]) -> Inbound {
        if self.ignore_echo(incoming) {
            return Inbound::Echo;
        }
        self.last_synced = Some(self.digest(incoming));
        self.pending.clear();
        Inbound::External
    }

    /// Count `incoming` as ignored if it is an echo. Leaves the guard
    /// untouched otherwise.
    pub fn ignore_echo(&mut self, incoming: &[FlatBlock]) -> bool {
        let d = self.digest(incoming);
        if self.last_synced == Some(d) {
            // Storage caught up; nothing older can be ours any more.
            self.pending.clear();
            self.echoes_ignored += 1;
            debug!(digest = ?d, "echo of synced state ignored");
            return true;
        }
        if self.pending.contains(&d) {
            self.echoes_ignored += 1;
            debug!(digest = ?d, "echo of in-flight state ignored");
            return true;
        }
        false
    }

    fn predict(&mut self, d: SnapshotDigest) {
        if self.pending.contains(&d) {
            return;
        }
        self.pending.push_back(d);
        while self.pending.len() > self.capacity {
            self.pending.pop_front();
        }
    }
}
