use crate::controller::{ActivationPolicy, DEFAULT_MAX_CONCURRENCY, RollbackPolicy};
use crate::core::{LocatorError, Result};
use serde::{Deserialize, Serialize};

/// Default number of cached lookups
pub const DEFAULT_CACHE_CAPACITY: usize = 20_000;

/// Service locator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocatorConfig {
    /// Locator name, used in log fields
    pub name: String,

    /// Maximum number of cached lookups; zero disables the cache
    pub cache_capacity: usize,

    /// Whether failed resolutions are cached as well
    pub cache_negative_results: bool,

    /// Activation policy used by `ServiceLocator::proceed_to`
    pub activation_policy: ActivationPolicy,

    /// Maximum activations running at once within one run level
    pub max_concurrency: usize,

    /// What a failed ascent tears down
    pub rollback_policy: RollbackPolicy,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_negative_results: false,
            activation_policy: ActivationPolicy::Concurrent,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            rollback_policy: RollbackPolicy::UnwindAll,
        }
    }
}

impl LocatorConfig {
    /// Create a configuration with defaults and the given locator name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Set the cache capacity (zero disables caching)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Enable or disable caching of failed resolutions
    pub fn cache_negative_results(mut self, enabled: bool) -> Self {
        self.cache_negative_results = enabled;
        self
    }

    /// Set the default activation policy
    pub fn activation_policy(mut self, policy: ActivationPolicy) -> Self {
        self.activation_policy = policy;
        self
    }

    /// Set the per-level concurrency bound
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the rollback policy
    pub fn rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// Parse from JSON; missing fields take their defaults
    ///
    /// # Examples
    ///
    /// ```
    /// # use runlevel_locator::LocatorConfig;
    /// let config = LocatorConfig::from_json(r#"{ "cache_capacity": 64 }"#).unwrap();
    /// assert_eq!(config.cache_capacity, 64);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LocatorError::InvalidConfig(e.to_string()))?;
        config.validate().map_err(LocatorError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("name cannot be empty".to_string());
        }

        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".to_string());
        }

        if self.max_concurrency > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(format!(
                "max_concurrency cannot exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LocatorConfig::new("app")
            .cache_capacity(128)
            .cache_negative_results(true)
            .activation_policy(ActivationPolicy::Sequential)
            .max_concurrency(4)
            .rollback_policy(RollbackPolicy::StepDown);

        assert_eq!(config.name, "app");
        assert_eq!(config.cache_capacity, 128);
        assert!(config.cache_negative_results);
        assert_eq!(config.activation_policy, ActivationPolicy::Sequential);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.rollback_policy, RollbackPolicy::StepDown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = LocatorConfig::default();
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(!config.cache_negative_results);
        assert_eq!(config.rollback_policy, RollbackPolicy::UnwindAll);
    }

    #[test]
    fn test_config_validation() {
        assert!(LocatorConfig::default().max_concurrency(0).validate().is_err());
        assert!(LocatorConfig::new("").validate().is_err());
        // A zero-sized cache is valid and disables caching
        assert!(LocatorConfig::default().cache_capacity(0).validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config = LocatorConfig::from_json(
            r#"{
                "name": "edge",
                "activation_policy": "sequential",
                "rollback_policy": "step_down"
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "edge");
        assert_eq!(config.activation_policy, ActivationPolicy::Sequential);
        assert_eq!(config.rollback_policy, RollbackPolicy::StepDown);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn test_config_from_json_rejects_bad_input() {
        assert!(matches!(
            LocatorConfig::from_json(r#"{ "cache_size": 1 }"#),
            Err(LocatorError::InvalidConfig(_))
        ));
        assert!(matches!(
            LocatorConfig::from_json(r#"{ "max_concurrency": 0 }"#),
            Err(LocatorError::InvalidConfig(_))
        ));
    }
}
