use crate::core::DeactivationError;
use std::time::Duration;

/// Result of a completed `proceed_to`
#[derive(Debug, Clone)]
pub struct ProceedReport {
    /// Level the transition started from
    pub from: i32,
    pub level_reached: i32,
    pub activated: usize,
    pub deactivated: usize,
    /// Teardowns that failed; the services are gone from the activation order
    /// regardless and may have leaked resources
    pub teardown_failures: Vec<DeactivationError>,
    pub elapsed: Duration,
}

impl ProceedReport {
    pub(crate) fn unchanged(level: i32) -> Self {
        Self {
            from: level,
            level_reached: level,
            activated: 0,
            deactivated: 0,
            teardown_failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// True if the controller did not move
    pub fn is_noop(&self) -> bool {
        self.from == self.level_reached && self.activated == 0 && self.deactivated == 0
    }

    /// True if no teardown failed along the way
    pub fn is_clean(&self) -> bool {
        self.teardown_failures.is_empty()
    }
}

impl std::fmt::Display for ProceedReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Run level {} -> {}: {} activated, {} deactivated, {} teardown failure(s) in {:?}",
            self.from,
            self.level_reached,
            self.activated,
            self.deactivated,
            self.teardown_failures.len(),
            self.elapsed
        )
    }
}
