use super::{ServiceDescriptor, ServiceHandle};
use crate::core::{LocatorError, RUNLEVEL_IMMEDIATE, Result, ServiceId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{Level, event};

/// Immutable view of the registry at one point in time
///
/// Every mutation builds a new snapshot (copy-on-write), so a transition
/// that grabbed one keeps a consistent view while services come and go.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    services: BTreeMap<ServiceId, ServiceHandle>,
    /// Per level, ordered by rank (highest first) then declaration order
    levels: BTreeMap<i32, Vec<ServiceHandle>>,
}

impl RegistrySnapshot {
    pub fn services_at(&self, level: i32) -> &[ServiceHandle] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: ServiceId) -> Option<&ServiceHandle> {
        self.services.get(&id)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.services.values()
    }

    /// Levels that have at least one service, ascending
    pub fn levels(&self) -> impl Iterator<Item = i32> + '_ {
        self.levels.keys().copied()
    }

    /// Populated levels within `low..=high`, ascending
    pub fn levels_between(&self, low: i32, high: i32) -> Vec<i32> {
        if low > high {
            return Vec::new();
        }
        self.levels.range(low..=high).map(|(level, _)| *level).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Registry of service descriptors indexed by run level
pub struct RunLevelRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    next_id: AtomicU64,
}

impl Default for RunLevelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLevelRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a service, assigning its id
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<ServiceHandle> {
        if let Some(level) = descriptor.level() {
            if level < RUNLEVEL_IMMEDIATE {
                return Err(LocatorError::InvalidRunLevel(level));
            }
        }

        let id = ServiceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handle: ServiceHandle = Arc::new(descriptor.with_id(id));

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = (**current).clone();
        next.services.insert(id, Arc::clone(&handle));
        if let Some(level) = handle.level() {
            let members = next.levels.entry(level).or_default();
            members.push(Arc::clone(&handle));
            members.sort_by(|a, b| b.ranking().cmp(&a.ranking()).then(a.id().cmp(&b.id())));
        }
        *current = Arc::new(next);

        event!(Level::DEBUG, service = %handle, "service registered");
        Ok(handle)
    }

    /// Remove a service; the returned handle names the contracts it advertised
    pub fn unregister(&self, id: ServiceId) -> Result<ServiceHandle> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = (**current).clone();
        let handle = next
            .services
            .remove(&id)
            .ok_or_else(|| LocatorError::ServiceNotFound(id.to_string()))?;

        if let Some(level) = handle.level() {
            if let Some(members) = next.levels.get_mut(&level) {
                members.retain(|s| s.id() != id);
                if members.is_empty() {
                    next.levels.remove(&level);
                }
            }
        }
        *current = Arc::new(next);

        event!(Level::DEBUG, service = %handle, "service unregistered");
        Ok(handle)
    }

    /// Consistent view of every registered service
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, id: ServiceId) -> Option<ServiceHandle> {
        self.snapshot().get(id).cloned()
    }

    /// Services declared at `level`, highest rank first, then declaration order
    pub fn services_at(&self, level: i32) -> Vec<ServiceHandle> {
        self.snapshot().services_at(level).to_vec()
    }

    pub fn level_of(&self, id: ServiceId) -> Option<i32> {
        self.get(id).and_then(|s| s.level())
    }

    pub fn services(&self) -> Vec<ServiceHandle> {
        self.snapshot().services().cloned().collect()
    }

    pub fn levels(&self) -> Vec<i32> {
        self.snapshot().levels().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
