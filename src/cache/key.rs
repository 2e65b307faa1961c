// ============================================================================
// Lookup Cache Key
// ============================================================================
//
// Identifies one resolution query: requested type, optional name, qualifier
// sequence and optional "unqualified" exclusion filter.
//
// The hash is folded once at construction. Equality checks the hash first
// and then every component structurally, so two keys that merely collide
// never share a cache entry.
//
// ============================================================================

use crate::core::{Qualifier, TypeDescriptor};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Folded into the hash whenever an exclusion filter is present, so an empty
/// filter still differs from no filter
const UNQUALIFIED_SENTINEL: u64 = 0xffff_ffff_ffff_ffff;

#[inline]
fn component_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone)]
pub struct CacheKey {
    /// Raw class name of the lookup type; only used for bulk invalidation
    removal_name: Option<String>,
    lookup_type: TypeDescriptor,
    name: Option<String>,
    qualifiers: Vec<Qualifier>,
    unqualified: Option<Vec<TypeDescriptor>>,
    hash: u64,
}

impl CacheKey {
    pub fn new(
        lookup_type: TypeDescriptor,
        name: Option<&str>,
        unqualified: Option<Vec<TypeDescriptor>>,
        qualifiers: Vec<Qualifier>,
    ) -> Self {
        let removal_name = lookup_type.raw_class_name().map(str::to_string);

        let mut hash = component_hash(&lookup_type);

        if let Some(name) = name {
            hash ^= component_hash(name);
        }

        for qualifier in &qualifiers {
            hash ^= component_hash(qualifier);
        }

        if let Some(excluded) = &unqualified {
            hash ^= UNQUALIFIED_SENTINEL;
            for ty in excluded {
                hash ^= component_hash(ty);
            }
        }

        Self {
            removal_name,
            lookup_type,
            name: name.map(str::to_string),
            qualifiers,
            unqualified,
            hash,
        }
    }

    /// Key for an unnamed, unqualified lookup of `lookup_type`
    pub fn of_type(lookup_type: TypeDescriptor) -> Self {
        Self::new(lookup_type, None, None, Vec::new())
    }

    /// Key for a lookup of `lookup_type` restricted to services called `name`
    pub fn named(lookup_type: TypeDescriptor, name: &str) -> Self {
        Self::new(lookup_type, Some(name), None, Vec::new())
    }

    pub fn hash_code(&self) -> u64 {
        self.hash
    }

    pub fn lookup_type(&self) -> &TypeDescriptor {
        &self.lookup_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn unqualified(&self) -> Option<&[TypeDescriptor]> {
        self.unqualified.as_deref()
    }

    pub fn removal_name(&self) -> Option<&str> {
        self.removal_name.as_deref()
    }

    /// True if this key belongs to the contract `name` and must be dropped
    /// when that contract leaves the registry
    pub fn matches_removal_name(&self, name: &str) -> bool {
        self.removal_name.as_deref() == Some(name)
    }
}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if self.hash != other.hash {
            return false;
        }

        // Vec equality is positional: same length, same order, equal elements
        self.lookup_type == other.lookup_type
            && self.name == other.name
            && self.qualifiers == other.qualifiers
            && self.unqualified == other.unqualified
    }
}

impl Eq for CacheKey {}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheKey({},{},{},{:#x})",
            self.lookup_type,
            self.name.as_deref().unwrap_or("-"),
            self.qualifiers.len(),
            self.hash
        )
    }
}
