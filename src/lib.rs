// ============================================================================
// Run Level Locator Library
// ============================================================================
//
// Runtime core of a service locator: a lookup cache that memoizes resolution
// queries, and a controller that brings services up and down in ordered run
// levels with reverse-order rollback on failure.
//
// ============================================================================

pub mod cache;
pub mod controller;
pub mod core;
pub mod facade;
pub mod interface;
pub mod registry;

// Re-export main types for convenience
pub use cache::{CacheEntry, CacheKey, CacheStats, LookupCache};
pub use controller::{
    ActivationPolicy, ActivationRecord, ControllerPhase, ProceedReport, RollbackPolicy,
    RunLevelController,
};
pub use crate::core::{
    ActivationError, Cancellation, DeactivationError, LocatorError, Qualifier, RUNLEVEL_IMMEDIATE,
    RUNLEVEL_INITIAL, Result, ServiceId, TypeDescriptor,
};
pub use facade::{LocatorConfig, ServiceLocator};
pub use interface::{Resolver, RunLevelListener, ServiceLifecycle};
pub use registry::{
    RegistryResolver, RegistrySnapshot, RunLevelRegistry, ServiceDescriptor, ServiceHandle,
};
