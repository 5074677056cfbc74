//! Persistence boundary.
//!
//! Storage is an external collaborator exposing bulk create/update/delete and
//! a full load per scope. The engine never retries on its own: a failed call
//! surfaces to the sync driver, which keeps its baseline and lets the next
//! pass re-derive whatever is still outstanding.

use async_trait::async_trait;
use blocksync_core::SyncDiff;
use blocksync_types::{BlockId, BlockPatch, DocumentId, FlatBlock};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};

/// One gateway call kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayOp {
    BulkCreate,
    BulkUpdate,
    BulkDelete,
    LoadAll,
}

/// Storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("{op} rejected: {reason}")]
    Rejected { op: GatewayOp, reason: String },
}

/// Full state of one scope as published by storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub scope: DocumentId,
    pub blocks: Vec<FlatBlock>,
}

/// Storage operations used by the sync driver.
///
/// Implementations must make `bulk_create` idempotent by id and treat
/// unknown ids in `bulk_delete` as a no-op. Deleting a block removes its
/// descendants as well.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn bulk_create(&self, scope: &DocumentId, blocks: &[FlatBlock]) -> Result<(), GatewayError>;

    /// Partial updates: only the fields set on each patch change.
    async fn bulk_update(&self, scope: &DocumentId, patches: &[BlockPatch]) -> Result<(), GatewayError>;

    async fn bulk_delete(&self, scope: &DocumentId, ids: &[BlockId]) -> Result<(), GatewayError>;

    /// Every block of the scope, in no particular order.
    async fn load_all(&self, scope: &DocumentId) -> Result<Vec<FlatBlock>, GatewayError>;
}

/// Push a diff in create → update → delete order, skipping empty phases.
///
/// Stops at the first failing phase; earlier phases are not rolled back.
pub async fn push_diff(
    gateway: &dyn PersistenceGateway,
    scope: &DocumentId,
    diff: &SyncDiff,
) -> Result<(), GatewayError> {
    if !diff.to_create.is_empty() {
        gateway
            .bulk_create(scope, &diff.to_create)
            .await
            .inspect_err(|e| warn!(%scope, count = diff.to_create.len(), error = %e, "bulk create failed"))?;
    }
    if !diff.to_update.is_empty() {
        gateway
            .bulk_update(scope, &diff.to_update)
            .await
            .inspect_err(|e| warn!(%scope, count = diff.to_update.len(), error = %e, "bulk update failed"))?;
    }
    if !diff.to_delete.is_empty() {
        gateway
            .bulk_delete(scope, &diff.to_delete)
            .await
            .inspect_err(|e| warn!(%scope, count = diff.to_delete.len(), error = %e, "bulk delete failed"))?;
    }
    debug!(
        %scope,
        created = diff.to_create.len(),
        updated = diff.to_update.len(),
        deleted = diff.to_delete.len(),
        "diff pushed"
    );
    Ok(())
}
