//! Per-document synchronization actor.
//!
//! One tokio task per document owns the scheduler, the baseline and the echo
//! guard. Everything else talks to it through a cloneable [`SyncHandle`].
//!
//! ```text
//!   SyncHandle (Clone)          mpsc        SyncActor (tokio task)
//!   ┌─────────────────────┐  ────────▶  ┌──────────────────────────────┐
//!   │ .notify_edit()      │             │ Scheduler + debounce timer   │
//!   │ .apply_snapshot()   │             │ SyncedDocument (baseline,    │
//!   │ .flush() .status()  │  ◀────────  │   echo guard)                │
//!   │ .close()            │   oneshot   │ TreeSource, Gateway          │
//!   └─────────────────────┘             └──────────────────────────────┘
//! ```
//!
//! The actor keeps reading commands while a gateway call is awaited, so edits
//! during a pass are queued as `SyncingWithPendingEdit` rather than blocking
//! the editor. At most one pass is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use blocksync_types::{DocumentId, FlatBlock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::SyncConfig;
use crate::gateway::{GatewayError, PersistenceGateway, ScopeSnapshot, push_diff};
use crate::scheduler::{Scheduler, SchedulerAction, SyncPhase};
use crate::sync::{PassReport, RemoteEffect, SyncedDocument};
use crate::tree::TreeSource;

// ============================================================================
// Error Type
// ============================================================================

/// Errors surfaced through a [`SyncHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("sync actor shut down")]
    Shutdown,
    #[error("document closed")]
    Closed,
}

// ============================================================================
// Status
// ============================================================================

/// Point-in-time view of a sync actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub scope: DocumentId,
    pub phase: SyncPhase,
    /// Baseline version; bumped on load, successful push and remote accept.
    pub version: u64,
    pub passes: u64,
    pub failed_passes: u64,
    pub echoes_ignored: u64,
    pub remote_applied: u64,
    pub last_error: Option<String>,
}

// ============================================================================
// Commands (internal)
// ============================================================================

type FlushReply = oneshot::Sender<Result<PassReport, SyncError>>;

enum SyncCommand {
    Edit,
    Snapshot(Vec<FlatBlock>),
    Flush { reply: FlushReply },
    Status { reply: oneshot::Sender<SyncStatus> },
    Close { reply: oneshot::Sender<SyncStatus> },
}

// ============================================================================
// SyncHandle (public API)
// ============================================================================

/// Handle to a running sync actor. Cheap to clone.
#[derive(Clone)]
pub struct SyncHandle {
    scope: DocumentId,
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    pub fn scope(&self) -> &DocumentId {
        &self.scope
    }

    /// The tree changed. Starts or restarts the debounce.
    pub fn notify_edit(&self) -> Result<(), SyncError> {
        self.tx.send(SyncCommand::Edit).map_err(|_| SyncError::Shutdown)
    }

    /// Storage published a new state for this scope.
    ///
    /// Held until the actor is idle; a newer snapshot replaces an older one.
    pub fn apply_snapshot(&self, blocks: Vec<FlatBlock>) -> Result<(), SyncError> {
        self.tx
            .send(SyncCommand::Snapshot(blocks))
            .map_err(|_| SyncError::Shutdown)
    }

    /// Run a pass now, skipping the debounce, and wait for its outcome.
    ///
    /// If a pass is already in flight and nothing changed since it started,
    /// its outcome is returned instead.
    pub async fn flush(&self) -> Result<PassReport, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::Flush { reply })
            .map_err(|_| SyncError::Shutdown)?;
        rx.await.map_err(|_| SyncError::Shutdown)?
    }

    /// Current counters and phase. Answered once the initial load is done.
    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::Status { reply })
            .map_err(|_| SyncError::Shutdown)?;
        rx.await.map_err(|_| SyncError::Shutdown)
    }

    /// Stop scheduling. An in-flight pass finishes first; a pending debounce
    /// is dropped. Returns the final status.
    pub async fn close(&self) -> Result<SyncStatus, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::Close { reply })
            .map_err(|_| SyncError::Shutdown)?;
        rx.await.map_err(|_| SyncError::Shutdown)
    }
}

// ============================================================================
// SyncActor (internal)
// ============================================================================

#[derive(Default)]
struct PassStats {
    passes: u64,
    failed_passes: u64,
    remote_applied: u64,
    last_error: Option<String>,
}

struct SyncActor {
    document: SyncedDocument,
    scheduler: Scheduler,
    tree: Arc<dyn TreeSource>,
    gateway: Arc<dyn PersistenceGateway>,
    debounce: Duration,
    deadline: Option<Instant>,
    /// Latest inbound snapshot not yet evaluated.
    pending_remote: Option<Vec<FlatBlock>>,
    /// Flushes waiting for the next pass.
    flush_waiters: Vec<FlushReply>,
    /// Flushes answered by the pass in flight.
    inflight_waiters: Vec<FlushReply>,
    close_waiters: Vec<oneshot::Sender<SyncStatus>>,
    /// Status requests made during the initial load.
    status_waiters: Vec<oneshot::Sender<SyncStatus>>,
    stats: PassStats,
}

impl SyncActor {
    fn new(
        config: &SyncConfig,
        scope: DocumentId,
        tree: Arc<dyn TreeSource>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            document: SyncedDocument::new(scope, config),
            scheduler: Scheduler::new(),
            tree,
            gateway,
            debounce: config.debounce(),
            deadline: None,
            pending_remote: None,
            flush_waiters: Vec::new(),
            inflight_waiters: Vec::new(),
            close_waiters: Vec::new(),
            status_waiters: Vec::new(),
            stats: PassStats::default(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
        self.load(&mut rx).await;

        loop {
            match self.scheduler.phase() {
                SyncPhase::Closed => break,
                SyncPhase::Idle => self.apply_pending_remote(),
                _ => {}
            }

            if !self.flush_waiters.is_empty() && self.scheduler.on_flush() == SchedulerAction::StartPass {
                self.deadline = None;
                self.run_pass(&mut rx).await;
                continue;
            }

            tokio::select! {
                _ = sleep_until(self.deadline) => {
                    self.deadline = None;
                    if self.scheduler.on_timer() == SchedulerAction::StartPass {
                        self.run_pass(&mut rx).await;
                    }
                }
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!(scope = %self.document.scope(), "all handles dropped");
                        self.scheduler.on_close();
                    }
                }
            }
        }

        self.shutdown();
    }

    async fn load(&mut self, rx: &mut mpsc::UnboundedReceiver<SyncCommand>) {
        let gateway = Arc::clone(&self.gateway);
        let scope = self.document.scope().clone();
        let loaded = self.drive(rx, async move { gateway.load_all(&scope).await }).await;

        match loaded {
            Ok(blocks) => {
                let tree = self.document.load(blocks);
                self.tree.replace_tree(tree);
            }
            Err(e) => {
                warn!(scope = %self.document.scope(), error = %e, "initial load failed, starting from an empty baseline");
                self.stats.last_error = Some(e.to_string());
                self.document.load(Vec::new());
            }
        }
        self.scheduler.on_load_complete();
        let status = self.status();
        for waiter in self.status_waiters.drain(..) {
            let _ = waiter.send(status.clone());
        }
    }

    fn handle_command(&mut self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::Edit => {
                if self.scheduler.on_edit() == SchedulerAction::ArmTimer {
                    self.deadline = Some(Instant::now() + self.debounce);
                }
            }
            SyncCommand::Snapshot(blocks) => {
                if self.scheduler.phase() == SyncPhase::Closed {
                    return;
                }
                if self.pending_remote.replace(blocks).is_some() {
                    trace!("held snapshot superseded");
                }
            }
            SyncCommand::Flush { reply } => match self.scheduler.phase() {
                SyncPhase::Closed => {
                    let _ = reply.send(Err(SyncError::Closed));
                }
                SyncPhase::Syncing => self.inflight_waiters.push(reply),
                _ => self.flush_waiters.push(reply),
            },
            SyncCommand::Status { reply } => {
                if self.scheduler.phase() == SyncPhase::Loading {
                    self.status_waiters.push(reply);
                } else {
                    let _ = reply.send(self.status());
                }
            }
            SyncCommand::Close { reply } => {
                self.scheduler.on_close();
                self.deadline = None;
                self.close_waiters.push(reply);
            }
        }
    }

    /// Await `fut` while still serving commands.
    async fn drive<F: Future>(&mut self, rx: &mut mpsc::UnboundedReceiver<SyncCommand>, fut: F) -> F::Output {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                out = &mut fut => return out,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                }
            }
        }
        // Every handle is gone; finish the call, then stop.
        self.scheduler.on_close();
        fut.await
    }

    #[instrument(skip_all, fields(scope = %self.document.scope()))]
    async fn run_pass(&mut self, rx: &mut mpsc::UnboundedReceiver<SyncCommand>) {
        self.inflight_waiters.append(&mut self.flush_waiters);

        // A snapshot held since the last pass may be our own late echo. After
        // this push it would look like a remote revert.
        let echoed = self
            .pending_remote
            .as_deref()
            .is_some_and(|blocks| self.document.discard_echo(blocks));
        if echoed {
            self.pending_remote = None;
        }

        let tree = self.tree.current_tree();
        let plan = self.document.plan(&tree);
        let report = PassReport::from_plan(&plan);

        let pushed = if plan.diff.is_empty() {
            trace!("nothing to push");
            Ok(())
        } else {
            self.document.record_attempt(&plan.diff);
            let gateway = Arc::clone(&self.gateway);
            let scope = self.document.scope().clone();
            let diff = plan.diff.clone();
            self.drive(rx, async move { push_diff(gateway.as_ref(), &scope, &diff).await })
                .await
        };

        let outcome = match pushed {
            Ok(()) => {
                if !plan.diff.is_empty() {
                    self.document.commit(plan.next);
                }
                self.stats.passes += 1;
                debug!(
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    version = self.document.version(),
                    "pass complete"
                );
                if report.truncated > 0 {
                    warn!(truncated = report.truncated, "blocks nested too deep were left unsynced");
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "pass failed, baseline kept, retrying after debounce");
                self.stats.failed_passes += 1;
                self.stats.last_error = Some(e.to_string());
                Err(SyncError::from(e))
            }
        };

        let next = if outcome.is_ok() {
            self.scheduler.on_pass_complete()
        } else {
            self.scheduler.on_pass_failed()
        };
        for waiter in self.inflight_waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
        if next == SchedulerAction::ArmTimer {
            self.deadline = Some(Instant::now() + self.debounce);
        }
    }

    fn apply_pending_remote(&mut self) {
        let Some(blocks) = self.pending_remote.take() else {
            return;
        };
        match self.document.receive_snapshot(blocks) {
            RemoteEffect::Echo => {}
            RemoteEffect::Rebuild(tree) => {
                info!(scope = %self.document.scope(), version = self.document.version(), "remote change applied");
                self.stats.remote_applied += 1;
                self.tree.replace_tree(tree);
            }
        }
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            scope: self.document.scope().clone(),
            phase: self.scheduler.phase(),
            version: self.document.version(),
            passes: self.stats.passes,
            failed_passes: self.stats.failed_passes,
            echoes_ignored: self.document.echo().echoes_ignored(),
            remote_applied: self.stats.remote_applied,
            last_error: self.stats.last_error.clone(),
        }
    }

    fn shutdown(mut self) {
        let status = self.status();
        info!(scope = %status.scope, passes = status.passes, "sync actor closed");
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(Err(SyncError::Closed));
        }
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(status.clone());
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Spawning
// ============================================================================

/// Start the sync actor for `scope` on the current tokio runtime.
///
/// The actor first loads the scope from `gateway` and replaces the tree with
/// it; edits notified before the load completes are not scheduled.
pub fn spawn_sync(
    config: &SyncConfig,
    scope: DocumentId,
    tree: Arc<dyn TreeSource>,
    gateway: Arc<dyn PersistenceGateway>,
) -> SyncHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = SyncActor::new(config, scope.clone(), tree, gateway);
    tokio::spawn(actor.run(rx));
    SyncHandle { scope, tx }
}

/// Forward a storage snapshot feed to the actor behind `handle`.
///
/// Snapshots for other scopes are ignored. Ends when the feed closes or the
/// actor is gone.
pub fn forward_snapshots(mut feed: broadcast::Receiver<ScopeSnapshot>, handle: SyncHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(snapshot) if snapshot.scope == *handle.scope() => {
                    if handle.apply_snapshot(snapshot.blocks).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(scope = %handle.scope(), skipped, "snapshot feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
