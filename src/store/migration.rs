use super::memory::Database;
use crate::core::{FixtureError, Result};
use std::fmt;
use std::sync::Arc;

type MigrationFn = Arc<dyn Fn(&mut SchemaBuilder<'_>) -> Result<()> + Send + Sync>;

/// One named schema change.
///
/// Migrations are applied in registration order and each id is recorded in
/// the database history, so re-running `migrate` only applies new ones.
#[derive(Clone)]
pub struct Migration {
    id: String,
    apply: MigrationFn,
}

impl Migration {
    pub fn new<F>(id: &str, apply: F) -> Self
    where
        F: Fn(&mut SchemaBuilder<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            apply: Arc::new(apply),
        }
    }

    /// Migration that creates the given collections
    pub fn create_collections(id: &str, collections: &[&str]) -> Self {
        let collections: Vec<String> = collections.iter().map(|c| c.to_string()).collect();
        Self::new(id, move |schema| {
            for collection in &collections {
                schema.create_collection(collection)?;
            }
            Ok(())
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn apply(&self, schema: &mut SchemaBuilder<'_>) -> Result<()> {
        (self.apply)(schema)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("id", &self.id).finish()
    }
}

/// Schema operations available to a migration
pub struct SchemaBuilder<'a> {
    database: &'a mut Database,
}

impl<'a> SchemaBuilder<'a> {
    pub(crate) fn new(database: &'a mut Database) -> Self {
        Self { database }
    }

    pub fn create_collection(&mut self, name: &str) -> Result<()> {
        if self.database.has_collection(name) {
            return Err(FixtureError::Store(format!(
                "collection '{}' already exists",
                name
            )));
        }
        self.database.create_collection(name);
        Ok(())
    }

    pub fn drop_collection(&mut self, name: &str) -> Result<()> {
        if !self.database.drop_collection(name) {
            return Err(FixtureError::CollectionNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.database.has_collection(name)
    }
}
