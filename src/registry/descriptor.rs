use crate::cache::CacheKey;
use crate::core::{Qualifier, ServiceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared, immutable handle to a registered service
pub type ServiceHandle = Arc<ServiceDescriptor>;

/// Metadata describing one service known to the locator
///
/// Built with the builder methods and handed to the registry, which assigns
/// the `ServiceId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(default = "unassigned_id")]
    id: ServiceId,
    implementation: String,
    #[serde(default)]
    contracts: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    qualifiers: Vec<Qualifier>,
    #[serde(default)]
    run_level: Option<i32>,
    #[serde(default)]
    rank: i32,
}

fn unassigned_id() -> ServiceId {
    ServiceId(0)
}

impl ServiceDescriptor {
    pub fn new(implementation: &str) -> Self {
        Self {
            id: unassigned_id(),
            implementation: implementation.to_string(),
            contracts: Vec::new(),
            name: None,
            qualifiers: Vec::new(),
            run_level: None,
            rank: 0,
        }
    }

    /// Advertise an additional contract
    pub fn contract(mut self, contract: &str) -> Self {
        if !self.contracts.iter().any(|c| c == contract) {
            self.contracts.push(contract.to_string());
        }
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Place the service in a run level
    pub fn run_level(mut self, level: i32) -> Self {
        self.run_level = Some(level);
        self
    }

    pub fn rank(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }

    pub(crate) fn with_id(mut self, id: ServiceId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    pub fn contracts(&self) -> &[String] {
        &self.contracts
    }

    pub fn service_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn level(&self) -> Option<i32> {
        self.run_level
    }

    pub fn ranking(&self) -> i32 {
        self.rank
    }

    /// Implementation name followed by every advertised contract
    pub fn advertised_contracts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.implementation.as_str())
            .chain(self.contracts.iter().map(String::as_str))
    }

    /// True if this service answers the query described by `key`
    pub fn satisfies(&self, key: &CacheKey) -> bool {
        let Some(raw) = key.lookup_type().raw_class_name() else {
            return false;
        };
        if !self.advertised_contracts().any(|c| c == raw) {
            return false;
        }

        if let Some(name) = key.name() {
            if self.name.as_deref() != Some(name) {
                return false;
            }
        }

        if !key.qualifiers().iter().all(|q| self.qualifiers.contains(q)) {
            return false;
        }

        match key.unqualified() {
            None => true,
            Some([]) => self.qualifiers.is_empty(),
            Some(excluded) => !self.qualifiers.iter().any(|q| {
                excluded
                    .iter()
                    .any(|ty| ty.raw_class_name() == Some(q.name()))
            }),
        }
    }
}

impl std::fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.implementation, self.id)?;
        if let Some(level) = self.run_level {
            write!(f, "@{}", level)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TypeDescriptor;

    fn database() -> ServiceDescriptor {
        ServiceDescriptor::new("PostgresDatabase")
            .contract("Database")
            .name("primary")
            .qualifier(Qualifier::new("Fast"))
    }

    #[test]
    fn test_satisfies_by_contract_or_implementation() {
        let svc = database();
        assert!(svc.satisfies(&CacheKey::of_type(TypeDescriptor::class("Database"))));
        assert!(svc.satisfies(&CacheKey::of_type(TypeDescriptor::class("PostgresDatabase"))));
        assert!(!svc.satisfies(&CacheKey::of_type(TypeDescriptor::class("Logger"))));
        assert!(!svc.satisfies(&CacheKey::of_type(TypeDescriptor::variable("T"))));
    }

    #[test]
    fn test_satisfies_by_name() {
        let svc = database();
        assert!(svc.satisfies(&CacheKey::named(TypeDescriptor::class("Database"), "primary")));
        assert!(!svc.satisfies(&CacheKey::named(TypeDescriptor::class("Database"), "replica")));
    }

    #[test]
    fn test_satisfies_qualifiers() {
        let svc = database();
        let fast = CacheKey::new(TypeDescriptor::class("Database"), None, None, vec![Qualifier::new("Fast")]);
        let remote = CacheKey::new(TypeDescriptor::class("Database"), None, None, vec![Qualifier::new("Remote")]);
        assert!(svc.satisfies(&fast));
        assert!(!svc.satisfies(&remote));
    }

    #[test]
    fn test_unqualified_filter() {
        let qualified = database();
        let plain = ServiceDescriptor::new("SqliteDatabase").contract("Database");

        let no_qualifiers = CacheKey::new(TypeDescriptor::class("Database"), None, Some(vec![]), vec![]);
        assert!(!qualified.satisfies(&no_qualifiers));
        assert!(plain.satisfies(&no_qualifiers));

        let not_fast = CacheKey::new(
            TypeDescriptor::class("Database"),
            None,
            Some(vec![TypeDescriptor::class("Fast")]),
            vec![],
        );
        assert!(!qualified.satisfies(&not_fast));
        assert!(plain.satisfies(&not_fast));
    }

    #[test]
    fn test_contracts_are_deduplicated() {
        let svc = ServiceDescriptor::new("Impl").contract("A").contract("A").contract("B");
        assert_eq!(svc.contracts(), &["A".to_string(), "B".to_string()]);
        assert_eq!(svc.advertised_contracts().collect::<Vec<_>>(), vec!["Impl", "A", "B"]);
    }
}
