use async_trait::async_trait;
use crate::cache::CacheKey;
use crate::core::Result;
use crate::registry::ServiceHandle;

/// Answers a resolution query with the service that satisfies it.
///
/// This is the (possibly expensive) step the lookup cache memoizes. An
/// implementation fails with `LocatorError::Resolution` when nothing matches
/// or the match is ambiguous.
pub trait Resolver: Send + Sync {
    fn resolve(&self, key: &CacheKey) -> Result<ServiceHandle>;
}

/// Brings a service up and tears it down.
///
/// Implemented by whatever owns the actual service instances. The controller
/// never holds one of its locks while calling into these methods, so they are
/// free to register or unregister services.
#[async_trait]
pub trait ServiceLifecycle: Send + Sync {
    /// Run the service's initialization.
    async fn activate(&self, service: &ServiceHandle) -> anyhow::Result<()>;

    /// Run the service's teardown. Called best-effort, exactly once per
    /// successful activation.
    async fn deactivate(&self, service: &ServiceHandle) -> anyhow::Result<()>;
}

/// Observer of run level transitions.
pub trait RunLevelListener: Send + Sync {
    /// A level was fully reached, going up or down.
    fn on_progress(&self, _level: i32) {}

    /// An activation failed; called before the rollback starts.
    fn on_error(&self, _service: &ServiceHandle, _level: i32, _reason: &str) {}

    /// A transition was cancelled; `level_reached` is where it settled.
    fn on_cancelled(&self, _level_reached: i32) {}
}
