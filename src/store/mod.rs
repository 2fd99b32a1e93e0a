// ============================================================================
// Store abstraction
// ============================================================================
//
// The fixture never talks to a concrete database. Everything it needs from a
// store goes through the traits below; `memory` provides the in-process
// implementation used by the test suite and by consumers without a server.

pub mod memory;
pub mod migration;
pub mod options;
pub mod query;

use crate::core::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use uuid::Uuid;

pub use memory::{MemoryServer, MemoryStoreContext};
pub use migration::{Migration, SchemaBuilder};
pub use options::StoreOptions;
pub use query::Query;

/// Primary key of a stored entity, normalized to its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! entity_key_from_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for EntityKey {
                fn from(value: $ty) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

entity_key_from_display!(i32, i64, u32, u64, usize, Uuid, String, &str, &String);

/// A record type persisted in one collection of a store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the collection holding this entity
    const COLLECTION: &'static str;

    fn key(&self) -> EntityKey;
}

/// A handle to one store, bound to one connection descriptor.
///
/// Contexts are cheap to clone; clones talk to the same database.
#[async_trait]
pub trait StoreContext: Send + Sync + 'static {
    /// Descriptor this context connects with
    fn connection_descriptor(&self) -> &str;

    /// Drop the database if it exists. Returns whether anything was dropped.
    async fn ensure_deleted(&self) -> Result<bool>;

    /// Create the database if needed and apply every pending migration.
    async fn migrate(&self) -> Result<()>;

    /// Flush buffered writes. Returns the number of affected entities.
    async fn save_changes(&self) -> Result<usize>;
}

/// Typed access to the collection of `E`.
#[async_trait]
pub trait EntityStore<E: Entity>: StoreContext {
    /// Buffer an insert until the next `save_changes`
    async fn add(&self, entity: &E) -> Result<()>;

    async fn add_range(&self, entities: &[E]) -> Result<()> {
        for entity in entities {
            self.add(entity).await?;
        }
        Ok(())
    }

    /// Buffer a replacement of an existing entity
    async fn update(&self, entity: &E) -> Result<()>;

    /// Buffer the removal of the entity stored under `key`
    async fn remove(&self, key: &EntityKey) -> Result<()>;

    /// Direct lookup by primary key
    async fn find(&self, key: &EntityKey) -> Result<Option<E>>;

    /// Run `query` against the collection and collect the results in order
    async fn materialize(&self, query: Query<E>) -> Result<Vec<E>>;
}

/// Store contexts that can be built from a [`StoreOptions`] value.
///
/// This is what lets the isolated-database factory swap the connection
/// descriptor and construct a fresh context from the result.
pub trait FromStoreOptions: Sized {
    fn from_options(options: StoreOptions) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_conversions() {
        assert_eq!(EntityKey::from(42i64).as_str(), "42");
        assert_eq!(EntityKey::from(7u32), EntityKey::new("7"));
        assert_eq!(EntityKey::from("abc").to_string(), "abc");

        let id = Uuid::nil();
        assert_eq!(
            EntityKey::from(id).as_str(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
