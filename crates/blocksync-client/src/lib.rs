//! Debounced, echo-safe synchronization of a block tree to storage.
//!
//! An editor mutates a tree (a [`TreeSource`]) and calls
//! [`SyncHandle::notify_edit`]. After a quiet period the sync actor diffs the
//! tree against the last synced baseline and pushes the diff through a
//! [`PersistenceGateway`]. Storage snapshots fed back through
//! [`forward_snapshots`] are either recognized as our own writes or rebuilt
//! into the tree.
//!
//! Can be driven without an actor through [`SyncedDocument`] and
//! [`Scheduler`], both plain values.

pub mod actor;
pub mod config;
pub mod constants;
pub mod echo;
pub mod gateway;
pub mod memory;
pub mod scheduler;
pub mod sync;
pub mod tree;

pub use actor::{SyncError, SyncHandle, SyncStatus, forward_snapshots, spawn_sync};
pub use config::{ConfigError, SyncConfig};
pub use echo::{EchoGuard, Inbound, SnapshotDigest};
pub use gateway::{GatewayError, GatewayOp, PersistenceGateway, ScopeSnapshot, push_diff};
pub use memory::MemoryGateway;
pub use scheduler::{Scheduler, SchedulerAction, SyncPhase};
pub use sync::{PassReport, RemoteEffect, SyncedDocument};
pub use tree::{SharedTree, TreeSource};
