//! Debounce/serialization state machine.
//!
//! Pure value: every transition returns the action the driver must take, so
//! the whole machine is tested without a runtime or a clock.
//!
//! ```text
//!                 edit                timer
//!   Loading ──▶ Idle ──────▶ PendingEdit ──────▶ Syncing ──────▶ Idle
//!    (load)       ▲           │  ▲  edit            │ edit          │
//!                 │           └──┘ (re-arm)         ▼               │
//!                 │                        SyncingWithPendingEdit   │
//!                 │                                 │ done          │
//!                 │                                 ▼               │
//!                 └────────────────────────── PendingEdit (re-arm) ◀┘
//! ```
//!
//! A failed pass lands in `PendingEdit` with the timer re-armed, whether or
//! not the tree was edited meanwhile.
//!
//! `Closed` is terminal and reachable from every state.

use serde::Serialize;
use strum::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Initial load in progress; edits are not scheduled.
    Loading,
    Idle,
    /// Debounce timer armed.
    PendingEdit,
    /// One pass in flight.
    Syncing,
    /// Pass in flight and edited since it started.
    SyncingWithPendingEdit,
    Closed,
}

/// What the driver does after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerAction {
    None,
    /// (Re)start the debounce timer from now.
    ArmTimer,
    /// Run one diff pass now.
    StartPass,
}

#[derive(Clone, Debug)]
pub struct Scheduler {
    phase: SyncPhase,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Loading,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn on_load_complete(&mut self) -> SchedulerAction {
        if self.phase == SyncPhase::Loading {
            self.phase = SyncPhase::Idle;
        }
        SchedulerAction::None
    }

    pub fn on_edit(&mut self) -> SchedulerAction {
        match self.phase {
            SyncPhase::Idle | SyncPhase::PendingEdit => {
                self.phase = SyncPhase::PendingEdit;
                SchedulerAction::ArmTimer
            }
            SyncPhase::Syncing | SyncPhase::SyncingWithPendingEdit => {
                self.phase = SyncPhase::SyncingWithPendingEdit;
                SchedulerAction::None
            }
            SyncPhase::Loading | SyncPhase::Closed => SchedulerAction::None,
        }
    }

    pub fn on_timer(&mut self) -> SchedulerAction {
        if self.phase == SyncPhase::PendingEdit {
            self.phase = SyncPhase::Syncing;
            SchedulerAction::StartPass
        } else {
            SchedulerAction::None
        }
    }

    /// Explicit request to sync now, skipping the debounce.
    pub fn on_flush(&mut self) -> SchedulerAction {
        match self.phase {
            SyncPhase::Idle | SyncPhase::PendingEdit => {
                self.phase = SyncPhase::Syncing;
                SchedulerAction::StartPass
            }
            _ => SchedulerAction::None,
        }
    }

    pub fn on_pass_complete(&mut self) -> SchedulerAction {
        match self.phase {
            SyncPhase::Syncing => {
                self.phase = SyncPhase::Idle;
                SchedulerAction::None
            }
            SyncPhase::SyncingWithPendingEdit => {
                self.phase = SyncPhase::PendingEdit;
                SchedulerAction::ArmTimer
            }
            _ => SchedulerAction::None,
        }
    }

    /// The pass did not reach storage; the tree is still unsynced, so try
    /// again after another debounce.
    pub fn on_pass_failed(&mut self) -> SchedulerAction {
        match self.phase {
            SyncPhase::Syncing | SyncPhase::SyncingWithPendingEdit => {
                self.phase = SyncPhase::PendingEdit;
                SchedulerAction::ArmTimer
            }
            _ => SchedulerAction::None,
        }
    }

    pub fn on_close(&mut self) -> SchedulerAction {
        self.phase = SyncPhase::Closed;
        SchedulerAction::None
    }
}
