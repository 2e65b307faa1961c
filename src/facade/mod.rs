pub mod config;
pub mod locator;

pub use config::{DEFAULT_CACHE_CAPACITY, LocatorConfig};
pub use locator::ServiceLocator;
