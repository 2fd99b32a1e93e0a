// ============================================================================
// RustMemDB Fixture Library
// ============================================================================
//
// Test-harness infrastructure for integration tests that touch a store:
// - one migration per connection descriptor per process (shared mode)
// - a private database per test, derived from the test name (isolated mode)
// - deferred assertions checked against a single store read

pub mod assertion;
pub mod connection;
pub mod core;
pub mod fixture;
pub mod isolation;
pub mod migration;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{FixtureError, Result};

pub use assertion::{AssertionQuery, CollectionCheck, EntityCheck, check, collection_check, expect_eq};
pub use connection::{ConnectionTarget, ConnectionTargetFactory, NameValuePairFactory, NameValuePairTarget};
pub use fixture::{FixtureSession, StoreFixture};
pub use isolation::{IsolatedContextFactory, IsolationKeyDeriver, TestIdentity};
pub use migration::{
    BootstrapCoordinator, BootstrapMode, BootstrapState, FixtureOptions, MigrationHandle,
    MigrationRegistry,
};
pub use store::{
    Entity, EntityKey, EntityStore, FromStoreOptions, MemoryServer, MemoryStoreContext, Migration,
    Query, SchemaBuilder, StoreContext, StoreOptions,
};

/// Prelude for test modules
///
/// # Examples
///
/// ```
/// use rustmemodb_fixture::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let options = StoreOptions::new("Server=memory;Database=prelude_docs")
///     .migration(Migration::create_collections("001_init", &["items"]));
/// let context = MemoryStoreContext::from_options(options)?;
///
/// BootstrapCoordinator::with_global_registry(FixtureOptions::new())
///     .bootstrap(&context)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::assertion::{AssertionQuery, check, collection_check, expect_eq};
    pub use crate::core::{FixtureError, Result};
    pub use crate::fixture::{FixtureSession, StoreFixture};
    pub use crate::isolation::IsolatedContextFactory;
    pub use crate::migration::{BootstrapCoordinator, FixtureOptions, MigrationRegistry};
    pub use crate::store::{
        Entity, EntityKey, EntityStore, FromStoreOptions, MemoryServer, MemoryStoreContext,
        Migration, Query, StoreContext, StoreOptions,
    };
}
