//! Synchronization defaults.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Quiet period after the last edit before a pass runs.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// [`DEFAULT_DEBOUNCE_MS`] as a `Duration`.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(DEFAULT_DEBOUNCE_MS);

/// Snapshot digests remembered as our own writes.
///
/// One push produces up to three storage states (after create, update and
/// delete), so eight covers two full passes plus the baseline.
pub const DEFAULT_ECHO_HISTORY: usize = 8;

/// Buffer of the in-memory gateway's snapshot broadcast.
/// Slow subscribers skip ahead; only the latest snapshot matters.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;
