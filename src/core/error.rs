use super::types::ServiceId;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("{0}")]
    Activation(Box<ActivationError>),

    #[error("{0}")]
    Cancelled(Box<Cancellation>),

    #[error("A run level transition to {0} is already in progress")]
    TransitionInProgress(i32),

    #[error("Invalid run level: {0}")]
    InvalidRunLevel(i32),

    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, LocatorError>;

impl LocatorError {
    /// Teardown warnings attached to a failed or cancelled transition
    pub fn teardown_failures(&self) -> &[DeactivationError] {
        match self {
            LocatorError::Activation(err) => &err.teardown_failures,
            LocatorError::Cancelled(err) => &err.teardown_failures,
            _ => &[],
        }
    }

    /// Run level the controller settled on after a failed or cancelled transition
    pub fn level_reached(&self) -> Option<i32> {
        match self {
            LocatorError::Activation(err) => Some(err.level_reached),
            LocatorError::Cancelled(err) => Some(err.level_reached),
            _ => None,
        }
    }
}

/// A service whose teardown callback failed
///
/// Never aborts an unwind or a descent; collected and reported once the
/// remaining services have been torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeactivationError {
    pub service: String,
    pub service_id: ServiceId,
    pub level: i32,
    pub reason: String,
}

impl fmt::Display for DeactivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Deactivation of '{}' ({}) at run level {} failed: {}",
            self.service, self.service_id, self.level, self.reason
        )
    }
}

/// Failure of a service activation during an ascent, after rollback
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationError {
    pub service: String,
    pub service_id: ServiceId,
    /// Level whose activation failed
    pub level: i32,
    pub reason: String,
    /// Level the controller rolled back to
    pub level_reached: i32,
    pub teardown_failures: Vec<DeactivationError>,
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Activation of '{}' at run level {} failed: {} (rolled back to run level {}",
            self.service, self.level, self.reason, self.level_reached
        )?;
        if !self.teardown_failures.is_empty() {
            write!(f, ", {} teardown failure(s)", self.teardown_failures.len())?;
        }
        write!(f, ")")
    }
}

/// A transition stopped by `cancel()`
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub level_reached: i32,
    pub teardown_failures: Vec<DeactivationError>,
}

impl fmt::Display for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run level transition cancelled at run level {}",
            self.level_reached
        )
    }
}
