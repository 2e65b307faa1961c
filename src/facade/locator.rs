use super::config::LocatorConfig;
use crate::cache::{CacheEntry, CacheKey, CacheStats, LookupCache};
use crate::controller::{ActivationPolicy, ProceedReport, RunLevelController};
use crate::core::{LocatorError, RUNLEVEL_INITIAL, Result, ServiceId, TypeDescriptor};
use crate::interface::{Resolver, RunLevelListener, ServiceLifecycle};
use crate::registry::{RegistryResolver, RunLevelRegistry, ServiceDescriptor, ServiceHandle};
use std::sync::Arc;
use tracing::{Level, event};

/// Service locator
///
/// Owns the registry, the lookup cache and the run level controller of one
/// locator instance. Several locators can live side by side.
///
/// # Examples
///
/// ```
/// use runlevel_locator::{ServiceDescriptor, ServiceHandle, ServiceLifecycle, ServiceLocator};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct NoopLifecycle;
///
/// #[async_trait]
/// impl ServiceLifecycle for NoopLifecycle {
///     async fn activate(&self, _service: &ServiceHandle) -> anyhow::Result<()> { Ok(()) }
///     async fn deactivate(&self, _service: &ServiceHandle) -> anyhow::Result<()> { Ok(()) }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let locator = ServiceLocator::new(Arc::new(NoopLifecycle))?;
/// locator.register(ServiceDescriptor::new("Postgres").contract("Database").run_level(1))?;
///
/// let report = locator.proceed_to(1).await?;
/// assert_eq!(report.level_reached, 1);
///
/// let db = locator.get_service_of_type("Database")?;
/// assert_eq!(db.implementation(), "Postgres");
///
/// locator.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct ServiceLocator {
    config: LocatorConfig,
    registry: Arc<RunLevelRegistry>,
    cache: LookupCache<ServiceHandle>,
    resolver: Arc<dyn Resolver>,
    controller: RunLevelController,
}

impl ServiceLocator {
    /// Create a locator with the default configuration
    pub fn new(lifecycle: Arc<dyn ServiceLifecycle>) -> Result<Self> {
        Self::with_config(LocatorConfig::default(), lifecycle)
    }

    /// Create a locator that resolves against its own registry
    pub fn with_config(config: LocatorConfig, lifecycle: Arc<dyn ServiceLifecycle>) -> Result<Self> {
        let registry = Arc::new(RunLevelRegistry::new());
        let resolver = Arc::new(RegistryResolver::new(Arc::clone(&registry)));
        Self::build(config, registry, resolver, lifecycle)
    }

    /// Create a locator with a custom resolution strategy
    pub fn with_resolver(
        config: LocatorConfig,
        resolver: Arc<dyn Resolver>,
        lifecycle: Arc<dyn ServiceLifecycle>,
    ) -> Result<Self> {
        Self::build(config, Arc::new(RunLevelRegistry::new()), resolver, lifecycle)
    }

    fn build(
        config: LocatorConfig,
        registry: Arc<RunLevelRegistry>,
        resolver: Arc<dyn Resolver>,
        lifecycle: Arc<dyn ServiceLifecycle>,
    ) -> Result<Self> {
        config.validate().map_err(LocatorError::InvalidConfig)?;

        let controller = RunLevelController::new(Arc::clone(&registry), lifecycle)
            .with_max_concurrency(config.max_concurrency)
            .with_rollback_policy(config.rollback_policy);

        Ok(Self {
            cache: LookupCache::new(config.cache_capacity),
            config,
            registry,
            resolver,
            controller,
        })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RunLevelRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &RunLevelController {
        &self.controller
    }

    /// Register a service and drop cached lookups it could change
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<ServiceHandle> {
        let handle = self.registry.register(descriptor)?;
        self.invalidate_contracts(&handle);
        Ok(handle)
    }

    /// Unregister a service and drop cached lookups that may point at it
    ///
    /// An active service stays in the activation order and is torn down by
    /// the next descent or rollback.
    pub fn unregister(&self, id: ServiceId) -> Result<ServiceHandle> {
        let handle = self.registry.unregister(id)?;
        self.invalidate_contracts(&handle);
        Ok(handle)
    }

    /// Resolve `key`, consulting the lookup cache first
    ///
    /// A result is only cached if no register, unregister or clear ran while
    /// it was being resolved; otherwise it is returned once and dropped.
    pub fn get_service(&self, key: &CacheKey) -> Result<ServiceHandle> {
        let generation = self.cache.generation();
        match self.cache.get(key) {
            Some(CacheEntry::Resolved(handle)) => return Ok(handle),
            Some(CacheEntry::Unresolved(reason)) => return Err(LocatorError::Resolution(reason)),
            None => {}
        }

        match self.resolver.resolve(key) {
            Ok(handle) => {
                self.cache.put_if_unchanged(
                    key.clone(),
                    CacheEntry::Resolved(Arc::clone(&handle)),
                    generation,
                );
                Ok(handle)
            }
            Err(LocatorError::Resolution(reason)) => {
                if self.config.cache_negative_results {
                    self.cache.put_if_unchanged(
                        key.clone(),
                        CacheEntry::Unresolved(reason.clone()),
                        generation,
                    );
                }
                Err(LocatorError::Resolution(reason))
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve the unnamed, unqualified service for `contract`
    pub fn get_service_of_type(&self, contract: &str) -> Result<ServiceHandle> {
        self.get_service(&CacheKey::of_type(TypeDescriptor::class(contract)))
    }

    /// Resolve the service called `name` for `contract`
    pub fn get_named_service(&self, contract: &str, name: &str) -> Result<ServiceHandle> {
        self.get_service(&CacheKey::named(TypeDescriptor::class(contract), name))
    }

    /// Move to `level` using the configured activation policy
    pub async fn proceed_to(&self, level: i32) -> Result<ProceedReport> {
        self.controller
            .proceed_to(level, self.config.activation_policy)
            .await
    }

    pub async fn proceed_to_with(&self, level: i32, policy: ActivationPolicy) -> Result<ProceedReport> {
        self.controller.proceed_to(level, policy).await
    }

    pub fn current_level(&self) -> i32 {
        self.controller.current_level()
    }

    pub fn cancel(&self) -> bool {
        self.controller.cancel()
    }

    pub fn add_listener(&self, listener: Arc<dyn RunLevelListener>) {
        self.controller.add_listener(listener);
    }

    /// Tear every run level service down
    pub async fn shutdown(&self) -> Result<ProceedReport> {
        event!(Level::INFO, locator = %self.config.name, "service locator shutting down");
        self.proceed_to(RUNLEVEL_INITIAL).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached lookup
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn invalidate_contracts(&self, handle: &ServiceHandle) {
        let removed: usize = handle
            .advertised_contracts()
            .map(|contract| self.cache.remove_by_contract_name(contract))
            .sum();
        if removed > 0 {
            event!(
                Level::DEBUG,
                locator = %self.config.name,
                service = %handle,
                removed,
                "cached lookups invalidated"
            );
        }
    }
}
