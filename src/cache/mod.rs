// ============================================================================
// Lookup Cache Module
// ============================================================================
//
// Memoizes resolution queries: `CacheKey` identifies a query, `LookupCache`
// holds the bounded LRU map of results with bulk invalidation by contract.
//
// ============================================================================

pub mod key;
pub mod lookup;

pub use key::CacheKey;
pub use lookup::{CacheEntry, CacheStats, LookupCache};
