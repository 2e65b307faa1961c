// ============================================================================
// Run Level Controller State
// ============================================================================
//
// Phase machine plus the activation order: the append-only log of services
// that are up, most recent last. The log is the teardown plan; it is popped
// from the tail, never reordered.
//
// ============================================================================

use crate::core::{RUNLEVEL_INITIAL, ServiceId};
use crate::registry::ServiceHandle;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

/// Controller phase
///
/// State transitions:
/// ```text
/// Idle ──target > current──> Ascending ──done──> Idle
///  │                             │
///  │                             └──failure/cancel──> Failed ──unwound──> Idle
///  │
///  └──target < current──> Descending ──done/cancel──> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Ascending,
    Descending,
    /// Rolling back after a failed or cancelled ascent
    Failed,
}

impl ControllerPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, ControllerPhase::Idle)
    }
}

impl std::fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerPhase::Idle => write!(f, "IDLE"),
            ControllerPhase::Ascending => write!(f, "ASCENDING"),
            ControllerPhase::Descending => write!(f, "DESCENDING"),
            ControllerPhase::Failed => write!(f, "FAILED"),
        }
    }
}

/// One entry of the activation order
#[derive(Debug, Clone)]
pub struct ActivationRecord {
    pub service: ServiceHandle,
    /// Level the service was activated for
    pub level: i32,
    /// Position in the activation order; strictly increasing
    pub sequence: u64,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct ControllerState {
    current_level: i32,
    phase: ControllerPhase,
    proposed_level: Option<i32>,
    cancel_requested: bool,
    activation_order: Vec<ActivationRecord>,
    /// Ids present in `activation_order`
    active: HashSet<ServiceId>,
    next_sequence: u64,
}

impl ControllerState {
    pub(crate) fn new() -> Self {
        Self {
            current_level: RUNLEVEL_INITIAL,
            phase: ControllerPhase::Idle,
            proposed_level: None,
            cancel_requested: false,
            activation_order: Vec::new(),
            active: HashSet::new(),
            next_sequence: 1,
        }
    }

    pub(crate) fn current_level(&self) -> i32 {
        self.current_level
    }

    pub(crate) fn set_current_level(&mut self, level: i32) {
        self.current_level = level;
    }

    pub(crate) fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub(crate) fn proposed_level(&self) -> Option<i32> {
        self.proposed_level
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Enter Ascending/Descending toward `target`; returns the starting level
    pub(crate) fn begin(&mut self, target: i32) -> i32 {
        self.phase = if target > self.current_level {
            ControllerPhase::Ascending
        } else {
            ControllerPhase::Descending
        };
        self.proposed_level = Some(target);
        self.cancel_requested = false;
        self.current_level
    }

    pub(crate) fn mark_failed(&mut self) {
        self.phase = ControllerPhase::Failed;
    }

    pub(crate) fn finish(&mut self) {
        self.phase = ControllerPhase::Idle;
        self.proposed_level = None;
        self.cancel_requested = false;
    }

    /// Flag a cancel; false if nothing is in flight
    pub(crate) fn request_cancel(&mut self) -> bool {
        if self.phase.is_idle() {
            return false;
        }
        self.cancel_requested = true;
        true
    }

    /// Append a freshly activated service to the activation order
    pub(crate) fn record(&mut self, service: ServiceHandle, level: i32) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.active.insert(service.id());
        self.activation_order.push(ActivationRecord {
            service,
            level,
            sequence,
            activated_at: Utc::now(),
        });
        sequence
    }

    /// Pop the most recent activation, but only if it belongs to a level at
    /// or above `floor` (any level when `floor` is `None`)
    pub(crate) fn pop_tail(&mut self, floor: Option<i32>) -> Option<ActivationRecord> {
        let tail_level = self.activation_order.last()?.level;
        match floor {
            Some(floor) if tail_level < floor => None,
            _ => {
                let record = self.activation_order.pop()?;
                self.active.remove(&record.service.id());
                Some(record)
            }
        }
    }

    pub(crate) fn is_active(&self, id: ServiceId) -> bool {
        self.active.contains(&id)
    }

    /// Distinct levels of active services above `level`, highest first
    pub(crate) fn active_levels_above(&self, level: i32) -> Vec<i32> {
        let levels: BTreeSet<i32> = self
            .activation_order
            .iter()
            .map(|r| r.level)
            .filter(|l| *l > level)
            .collect();
        levels.into_iter().rev().collect()
    }

    pub(crate) fn activation_order(&self) -> &[ActivationRecord] {
        &self.activation_order
    }
}
