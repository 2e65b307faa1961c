// ============================================================================
// Run Level Controller Module
// ============================================================================
//
// Brings services up and down in ordered stages ("run levels").
//
// Design Patterns Used:
// - State Pattern: controller phase (Idle, Ascending, Descending, Failed)
// - Append-only log: the activation order doubles as the teardown plan
// - Cleanup list: rollback attempts every teardown, failures are collected
//
// ============================================================================

pub mod policy;
pub mod report;
pub mod state;
pub mod transition;

pub use policy::{ActivationPolicy, RollbackPolicy};
pub use report::ProceedReport;
pub use state::{ActivationRecord, ControllerPhase};
pub use transition::{DEFAULT_MAX_CONCURRENCY, RunLevelController};
