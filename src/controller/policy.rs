use serde::{Deserialize, Serialize};

/// How the services of one level are brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// One at a time, in declared order
    Sequential,
    /// In parallel, bounded by the controller's concurrency limit
    #[default]
    Concurrent,
}

/// What a failed (or cancelled) ascent tears down
///
/// The default unwinds everything rather than stopping at the last level
/// that came up cleanly: the activation order then holds no service above
/// the reported level, and the caller restarts from a known empty state.
/// `StepDown` keeps the levels below the failing one up and reports
/// `failing - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Every active service, whatever its level; ends at `RUNLEVEL_INITIAL`
    #[default]
    UnwindAll,
    /// Only services at or above the failing level; ends one level below it
    StepDown,
}

impl std::fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationPolicy::Sequential => write!(f, "sequential"),
            ActivationPolicy::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl std::fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackPolicy::UnwindAll => write!(f, "unwind_all"),
            RollbackPolicy::StepDown => write!(f, "step_down"),
        }
    }
}
