// ============================================================================
// Service Registry Module
// ============================================================================
//
// Descriptors of every known service, with an index of the services that
// belong to each run level. Reads hand out copy-on-write snapshots.
//
// ============================================================================

pub mod descriptor;
pub mod resolver;
pub mod run_level;

pub use descriptor::{ServiceDescriptor, ServiceHandle};
pub use resolver::RegistryResolver;
pub use run_level::{RegistrySnapshot, RunLevelRegistry};
