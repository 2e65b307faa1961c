use super::{RunLevelRegistry, ServiceHandle};
use crate::cache::CacheKey;
use crate::core::{LocatorError, Result};
use crate::interface::Resolver;
use std::sync::Arc;

/// Resolves queries against the descriptors in a `RunLevelRegistry`
///
/// The best match is the one with the highest rank. No match, or two matches
/// sharing the highest rank, is a resolution error.
pub struct RegistryResolver {
    registry: Arc<RunLevelRegistry>,
}

impl RegistryResolver {
    pub fn new(registry: Arc<RunLevelRegistry>) -> Self {
        Self { registry }
    }
}

impl Resolver for RegistryResolver {
    fn resolve(&self, key: &CacheKey) -> Result<ServiceHandle> {
        let snapshot = self.registry.snapshot();
        let mut candidates: Vec<&ServiceHandle> =
            snapshot.services().filter(|s| s.satisfies(key)).collect();

        candidates.sort_by(|a, b| b.ranking().cmp(&a.ranking()).then(a.id().cmp(&b.id())));

        match candidates.as_slice() {
            [] => Err(LocatorError::Resolution(format!(
                "no service satisfies {}",
                key
            ))),
            [best, next, ..] if best.ranking() == next.ranking() => {
                Err(LocatorError::Resolution(format!(
                    "{} is ambiguous: '{}' and '{}' share rank {}",
                    key,
                    best.implementation(),
                    next.implementation(),
                    best.ranking()
                )))
            }
            [best, ..] => Ok(Arc::clone(best)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TypeDescriptor;
    use crate::registry::ServiceDescriptor;

    fn resolver_with(descriptors: Vec<ServiceDescriptor>) -> RegistryResolver {
        let registry = Arc::new(RunLevelRegistry::new());
        for d in descriptors {
            registry.register(d).unwrap();
        }
        RegistryResolver::new(registry)
    }

    #[test]
    fn test_resolves_single_match() {
        let resolver = resolver_with(vec![ServiceDescriptor::new("Postgres").contract("Database")]);
        let svc = resolver.resolve(&CacheKey::of_type(TypeDescriptor::class("Database"))).unwrap();
        assert_eq!(svc.implementation(), "Postgres");
    }

    #[test]
    fn test_highest_rank_wins() {
        let resolver = resolver_with(vec![
            ServiceDescriptor::new("Postgres").contract("Database"),
            ServiceDescriptor::new("Sqlite").contract("Database").rank(5),
        ]);
        let svc = resolver.resolve(&CacheKey::of_type(TypeDescriptor::class("Database"))).unwrap();
        assert_eq!(svc.implementation(), "Sqlite");
    }

    #[test]
    fn test_no_match_is_resolution_error() {
        let resolver = resolver_with(vec![]);
        let err = resolver.resolve(&CacheKey::of_type(TypeDescriptor::class("Database"))).unwrap_err();
        assert!(matches!(err, LocatorError::Resolution(_)));
    }

    #[test]
    fn test_tie_is_ambiguous() {
        let resolver = resolver_with(vec![
            ServiceDescriptor::new("Postgres").contract("Database"),
            ServiceDescriptor::new("Sqlite").contract("Database"),
        ]);
        let err = resolver.resolve(&CacheKey::of_type(TypeDescriptor::class("Database"))).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }
}
