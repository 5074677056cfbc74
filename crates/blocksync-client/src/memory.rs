//! In-process [`PersistenceGateway`] backed by one [`StateIndex`] per scope.
//!
//! Publishes the full scope to broadcast subscribers after every successful
//! bulk call, the way a change feed from real storage would. Faults can be
//! injected per operation to exercise the failure path.

use std::collections::HashMap;

use async_trait::async_trait;
use blocksync_core::StateIndex;
use blocksync_types::{BlockId, BlockPatch, DocumentId, FlatBlock};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::constants::SNAPSHOT_CHANNEL_CAPACITY;
use crate::gateway::{GatewayError, GatewayOp, PersistenceGateway, ScopeSnapshot};

pub struct MemoryGateway {
    scopes: DashMap<DocumentId, StateIndex>,
    snapshots: broadcast::Sender<ScopeSnapshot>,
    fail_points: Mutex<Vec<GatewayOp>>,
    calls: Mutex<HashMap<GatewayOp, usize>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            scopes: DashMap::new(),
            snapshots,
            fail_points: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Replace a scope's contents without publishing.
    pub fn seed(&self, scope: &DocumentId, blocks: Vec<FlatBlock>) {
        self.scopes.insert(scope.clone(), StateIndex::from_blocks(blocks));
    }

    /// Stored blocks of `scope`, sorted by id.
    pub fn blocks(&self, scope: &DocumentId) -> Vec<FlatBlock> {
        self.scopes
            .get(scope)
            .map(|index| index.to_blocks())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScopeSnapshot> {
        self.snapshots.subscribe()
    }

    /// Make the next call of `op` fail with [`GatewayError::Unavailable`].
    pub fn fail_next(&self, op: GatewayOp) {
        self.fail_points.lock().push(op);
    }

    /// Calls of `op` so far, failed ones included.
    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Count the call and consume a matching fail point.
    fn enter(&self, op: GatewayOp) -> Result<(), GatewayError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        let mut fail_points = self.fail_points.lock();
        if let Some(pos) = fail_points.iter().position(|p| *p == op) {
            fail_points.remove(pos);
            debug!(%op, "injected failure");
            return Err(GatewayError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }

    fn mutate(&self, scope: &DocumentId, f: impl FnOnce(&mut StateIndex)) {
        let blocks = {
            let mut index = self.scopes.entry(scope.clone()).or_default();
            f(&mut *index);
            index.to_blocks()
        };
        trace!(%scope, blocks = blocks.len(), "publishing snapshot");
        // No subscribers is fine.
        let _ = self.snapshots.send(ScopeSnapshot {
            scope: scope.clone(),
            blocks,
        });
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn bulk_create(&self, scope: &DocumentId, blocks: &[FlatBlock]) -> Result<(), GatewayError> {
        self.enter(GatewayOp::BulkCreate)?;
        self.mutate(scope, |index| index.apply_creates(blocks));
        Ok(())
    }

    async fn bulk_update(&self, scope: &DocumentId, patches: &[BlockPatch]) -> Result<(), GatewayError> {
        self.enter(GatewayOp::BulkUpdate)?;
        self.mutate(scope, |index| {
            for patch in patches {
                if !index.apply_patch(patch) {
                    debug!(id = %patch.id, "patch for unknown block ignored");
                }
            }
        });
        Ok(())
    }

    async fn bulk_delete(&self, scope: &DocumentId, ids: &[BlockId]) -> Result<(), GatewayError> {
        self.enter(GatewayOp::BulkDelete)?;
        self.mutate(scope, |index| index.apply_deletes(ids));
        Ok(())
    }

    async fn load_all(&self, scope: &DocumentId) -> Result<Vec<FlatBlock>, GatewayError> {
        self.enter(GatewayOp::LoadAll)?;
        Ok(self.blocks(scope))
    }
}
