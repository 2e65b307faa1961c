pub mod error;
pub mod types;

pub use error::{ActivationError, Cancellation, DeactivationError, LocatorError, Result};
pub use types::{Qualifier, RUNLEVEL_IMMEDIATE, RUNLEVEL_INITIAL, ServiceId, TypeDescriptor};
