pub mod coordinator;
pub mod options;
pub mod registry;

pub use coordinator::{BootstrapCoordinator, BootstrapMode, BootstrapState};
pub use options::FixtureOptions;
pub use registry::{MigrationHandle, MigrationRegistry};
