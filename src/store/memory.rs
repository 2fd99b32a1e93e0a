use super::migration::SchemaBuilder;
use super::{Entity, EntityKey, EntityStore, FromStoreOptions, Query, StoreContext, StoreOptions};
use crate::connection::{ConnectionTarget, NameValuePairFactory};
use crate::core::{FixtureError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

// Global singleton instance of MemoryServer
lazy_static! {
    static ref GLOBAL_SERVER: Arc<MemoryServer> = Arc::new(MemoryServer::new());
}

/// Entities of one type, kept in insertion order
#[derive(Debug, Clone, Default)]
pub(crate) struct Collection {
    order: Vec<EntityKey>,
    rows: HashMap<EntityKey, Value>,
}

impl Collection {
    fn insert(&mut self, name: &str, key: EntityKey, value: Value) -> Result<()> {
        if self.rows.contains_key(&key) {
            return Err(FixtureError::Store(format!(
                "duplicate key '{}' in collection '{}'",
                key, name
            )));
        }
        self.order.push(key.clone());
        self.rows.insert(key, value);
        Ok(())
    }

    fn replace(&mut self, name: &str, key: EntityKey, value: Value) -> Result<()> {
        match self.rows.get_mut(&key) {
            Some(existing) => {
                *existing = value;
                Ok(())
            }
            None => Err(FixtureError::Store(format!(
                "key '{}' not found in collection '{}'",
                key, name
            ))),
        }
    }

    fn remove(&mut self, name: &str, key: &EntityKey) -> Result<()> {
        if self.rows.remove(key).is_none() {
            return Err(FixtureError::Store(format!(
                "key '{}' not found in collection '{}'",
                key, name
            )));
        }
        self.order.retain(|k| k != key);
        Ok(())
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.order.iter().filter_map(|key| self.rows.get(key))
    }
}

/// One named database: its migration history and its collections
#[derive(Debug, Clone, Default)]
pub(crate) struct Database {
    applied: Vec<String>,
    collections: HashMap<String, Collection>,
}

impl Database {
    pub(crate) fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub(crate) fn create_collection(&mut self, name: &str) {
        self.collections.entry(name.to_string()).or_default();
    }

    pub(crate) fn drop_collection(&mut self, name: &str) -> bool {
        self.collections.remove(name).is_some()
    }

    fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| FixtureError::CollectionNotFound(name.to_string()))
    }
}

/// In-process database server holding any number of named databases.
///
/// [`MemoryServer::global`] is shared by every context built through
/// [`FromStoreOptions`], the same way a real server is shared by every test in
/// a run. Tests that need a private server construct one with
/// [`MemoryServer::new`] and connect with [`MemoryStoreContext::connect`].
pub struct MemoryServer {
    databases: RwLock<HashMap<String, Arc<RwLock<Database>>>>,
}

impl MemoryServer {
    /// Get the global MemoryServer instance
    pub fn global() -> &'static Arc<MemoryServer> {
        &GLOBAL_SERVER
    }

    pub fn new() -> Self {
        Self {
            databases: RwLock::new(HashMap::new()),
        }
    }

    pub async fn database_exists(&self, name: &str) -> bool {
        self.databases.read().await.contains_key(name)
    }

    /// Names of all databases, sorted
    pub async fn list_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a database. Returns whether it existed.
    pub async fn drop_database(&self, name: &str) -> bool {
        self.databases.write().await.remove(name).is_some()
    }

    /// Ids of the migrations applied to `name`, in application order
    pub async fn applied_migrations(&self, name: &str) -> Result<Vec<String>> {
        let database = self.open(name).await?;
        let guard = database.read().await;
        Ok(guard.applied.clone())
    }

    /// Number of entities stored in one collection
    pub async fn count(&self, database: &str, collection: &str) -> Result<usize> {
        let database = self.open(database).await?;
        let guard = database.read().await;
        Ok(guard.collection(collection)?.rows.len())
    }

    async fn open(&self, name: &str) -> Result<Arc<RwLock<Database>>> {
        self.databases
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::Store(format!("database '{}' does not exist", name)))
    }

    async fn open_or_create(&self, name: &str) -> Arc<RwLock<Database>> {
        let mut databases = self.databases.write().await;
        Arc::clone(databases.entry(name.to_string()).or_default())
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
enum PendingWrite {
    Insert {
        collection: &'static str,
        key: EntityKey,
        value: Value,
    },
    Update {
        collection: &'static str,
        key: EntityKey,
        value: Value,
    },
    Remove {
        collection: &'static str,
        key: EntityKey,
    },
}

impl PendingWrite {
    fn collection(&self) -> &'static str {
        match self {
            Self::Insert { collection, .. }
            | Self::Update { collection, .. }
            | Self::Remove { collection, .. } => collection,
        }
    }
}

/// Store context bound to one database of a [`MemoryServer`].
///
/// The database is named by the `Database` facet of the connection string.
/// Writes are buffered by `add`/`update`/`remove` and flushed atomically by
/// `save_changes`. Clones share the same write buffer.
#[derive(Clone)]
pub struct MemoryStoreContext {
    server: Arc<MemoryServer>,
    options: Arc<StoreOptions>,
    database: String,
    pending: Arc<Mutex<Vec<PendingWrite>>>,
}

impl MemoryStoreContext {
    /// Connect to `server` using `options`
    ///
    /// # Examples
    ///
    /// ```
    /// use rustmemodb_fixture::store::{MemoryServer, MemoryStoreContext, StoreOptions};
    /// use std::sync::Arc;
    ///
    /// let server = Arc::new(MemoryServer::new());
    /// let context = MemoryStoreContext::connect(
    ///     server,
    ///     StoreOptions::new("Server=memory;Database=orders"),
    /// ).unwrap();
    ///
    /// assert_eq!(context.database_name(), "orders");
    /// ```
    pub fn connect(server: Arc<MemoryServer>, options: StoreOptions) -> Result<Self> {
        options.validate()?;

        let target = NameValuePairFactory::default().parse(&options.connection_string);
        let database = target
            .database()
            .ok_or_else(|| {
                FixtureError::Configuration(format!(
                    "connection string '{}' does not name a database",
                    target.redacted()
                ))
            })?
            .to_string();

        Ok(Self {
            server,
            options: Arc::new(options),
            database,
            pending: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of buffered writes not yet saved
    pub fn pending_changes(&self) -> Result<usize> {
        Ok(self.pending.lock()?.len())
    }

    /// Typed lookup by key
    pub async fn get<E: Entity>(&self, key: impl Into<EntityKey>) -> Result<Option<E>> {
        EntityStore::<E>::find(self, &key.into()).await
    }

    /// Every entity of type `E`, in insertion order
    pub async fn all<E: Entity>(&self) -> Result<Vec<E>> {
        EntityStore::<E>::materialize(self, Query::all()).await
    }

    fn buffer(&self, write: PendingWrite) -> Result<()> {
        if self.options.sensitive_data_logging {
            debug!(database = %self.database, write = ?write, "buffered write");
        } else {
            debug!(database = %self.database, collection = write.collection(), "buffered write");
        }
        self.pending.lock()?.push(write);
        Ok(())
    }

    async fn run<T, F>(&self, command: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.options.command_timeout {
            Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| {
                FixtureError::Store(format!("{} timed out after {:?}", command, limit))
            })?,
            None => future.await,
        }
    }
}

#[async_trait]
impl StoreContext for MemoryStoreContext {
    fn connection_descriptor(&self) -> &str {
        &self.options.connection_string
    }

    async fn ensure_deleted(&self) -> Result<bool> {
        let dropped = self.server.drop_database(&self.database).await;
        debug!(database = %self.database, dropped, "ensure_deleted");
        Ok(dropped)
    }

    async fn migrate(&self) -> Result<()> {
        self.run("migrate", async {
            let database = self.server.open_or_create(&self.database).await;

            for migration in &self.options.migrations {
                {
                    let mut guard = database.write().await;
                    if guard.applied.iter().any(|id| id == migration.id()) {
                        continue;
                    }

                    // Schema changes of a failing migration are discarded
                    let mut staged = guard.clone();
                    let mut schema = SchemaBuilder::new(&mut staged);
                    migration.apply(&mut schema).map_err(|e| {
                        FixtureError::Store(format!(
                            "migration '{}' failed: {}",
                            migration.id(),
                            e
                        ))
                    })?;
                    staged.applied.push(migration.id().to_string());
                    *guard = staged;
                }

                debug!(database = %self.database, migration = migration.id(), "applied migration");
                tokio::task::yield_now().await;
            }

            Ok(())
        })
        .await
    }

    async fn save_changes(&self) -> Result<usize> {
        let writes = std::mem::take(&mut *self.pending.lock()?);
        if writes.is_empty() {
            return Ok(0);
        }

        let saved = self.run("save_changes", async {
            let database = self.server.open(&self.database).await?;
            let mut guard = database.write().await;

            // Stage on a copy so a failing write leaves the database untouched
            let mut staged = guard.collections.clone();
            for write in &writes {
                let name = write.collection();
                let collection = staged
                    .get_mut(name)
                    .ok_or_else(|| FixtureError::CollectionNotFound(name.to_string()))?;

                match write {
                    PendingWrite::Insert { key, value, .. } => {
                        collection.insert(name, key.clone(), value.clone())?
                    }
                    PendingWrite::Update { key, value, .. } => {
                        collection.replace(name, key.clone(), value.clone())?
                    }
                    PendingWrite::Remove { key, .. } => collection.remove(name, key)?,
                }
            }

            guard.collections = staged;
            Ok(writes.len())
        })
        .await;

        if saved.is_err() {
            // Keep the writes buffered, ahead of anything added meanwhile
            let mut pending = self.pending.lock()?;
            let added = std::mem::replace(&mut *pending, writes);
            pending.extend(added);
        }
        saved
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryStoreContext {
    async fn add(&self, entity: &E) -> Result<()> {
        self.buffer(PendingWrite::Insert {
            collection: E::COLLECTION,
            key: entity.key(),
            value: serde_json::to_value(entity)?,
        })
    }

    async fn update(&self, entity: &E) -> Result<()> {
        self.buffer(PendingWrite::Update {
            collection: E::COLLECTION,
            key: entity.key(),
            value: serde_json::to_value(entity)?,
        })
    }

    async fn remove(&self, key: &EntityKey) -> Result<()> {
        self.buffer(PendingWrite::Remove {
            collection: E::COLLECTION,
            key: key.clone(),
        })
    }

    async fn find(&self, key: &EntityKey) -> Result<Option<E>> {
        self.run("find", async {
            let database = self.server.open(&self.database).await?;
            let guard = database.read().await;

            match guard.collection(E::COLLECTION)?.rows.get(key) {
                Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn materialize(&self, query: Query<E>) -> Result<Vec<E>> {
        let rows = self
            .run("materialize", async {
                let database = self.server.open(&self.database).await?;
                let guard = database.read().await;

                guard
                    .collection(E::COLLECTION)?
                    .values()
                    .map(|value| serde_json::from_value::<E>(value.clone()).map_err(FixtureError::from))
                    .collect::<Result<Vec<E>>>()
            })
            .await?;

        Ok(query.apply(rows))
    }
}

impl FromStoreOptions for MemoryStoreContext {
    fn from_options(options: StoreOptions) -> Result<Self> {
        Self::connect(Arc::clone(MemoryServer::global()), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Migration;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: i64,
        text: String,
    }

    impl Entity for Note {
        const COLLECTION: &'static str = "notes";

        fn key(&self) -> EntityKey {
            self.id.into()
        }
    }

    fn note(id: i64, text: &str) -> Note {
        Note {
            id,
            text: text.to_string(),
        }
    }

    fn create_test_context(server: &Arc<MemoryServer>) -> MemoryStoreContext {
        let options = StoreOptions::new("Server=memory;Database=notes_db")
            .migration(Migration::create_collections("001_notes", &["notes"]));
        MemoryStoreContext::connect(Arc::clone(server), options).unwrap()
    }

    #[test]
    fn test_connect_requires_database_facet() {
        let server = Arc::new(MemoryServer::new());
        let result = MemoryStoreContext::connect(server, StoreOptions::new("Server=memory"));

        assert!(matches!(result, Err(FixtureError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_migrate_is_incremental() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);

        context.migrate().await.unwrap();
        context.migrate().await.unwrap();

        assert_eq!(
            server.applied_migrations("notes_db").await.unwrap(),
            vec!["001_notes".to_string()]
        );
    }

    #[tokio::test]
    async fn test_add_is_buffered_until_save() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);
        context.migrate().await.unwrap();

        context.add(&note(1, "first")).await.unwrap();
        assert_eq!(context.pending_changes().unwrap(), 1);
        assert!(context.all::<Note>().await.unwrap().is_empty());

        assert_eq!(context.save_changes().await.unwrap(), 1);
        assert_eq!(context.all::<Note>().await.unwrap(), vec![note(1, "first")]);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_database_untouched() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);
        context.migrate().await.unwrap();

        context.add(&note(1, "first")).await.unwrap();
        context.add(&note(1, "duplicate")).await.unwrap();

        assert!(context.save_changes().await.is_err());
        assert_eq!(server.count("notes_db", "notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_writes_buffered() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);
        context.migrate().await.unwrap();

        context.add(&note(1, "first")).await.unwrap();
        context.add(&note(1, "duplicate")).await.unwrap();
        assert!(context.save_changes().await.is_err());
        assert_eq!(context.pending_changes().unwrap(), 2);

        context.add(&note(2, "later")).await.unwrap();
        assert!(context.save_changes().await.is_err());
        assert_eq!(context.pending_changes().unwrap(), 3);
        assert_eq!(server.count("notes_db", "notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_save_before_migration_can_be_retried() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);

        context.add(&note(1, "early")).await.unwrap();
        assert!(context.save_changes().await.is_err());
        assert_eq!(context.pending_changes().unwrap(), 1);

        context.migrate().await.unwrap();
        assert_eq!(context.save_changes().await.unwrap(), 1);
        assert_eq!(context.all::<Note>().await.unwrap(), vec![note(1, "early")]);
    }

    #[tokio::test]
    async fn test_failing_migration_leaves_no_partial_schema() {
        let server = Arc::new(MemoryServer::new());
        let broken = StoreOptions::new("Server=memory;Database=partial_db").migration(
            Migration::new("001_half", |schema| {
                schema.create_collection("notes")?;
                Err(FixtureError::Store("second statement failed".to_string()))
            }),
        );
        let context = MemoryStoreContext::connect(Arc::clone(&server), broken).unwrap();

        assert!(context.migrate().await.is_err());
        assert!(server.applied_migrations("partial_db").await.unwrap().is_empty());
        assert_eq!(
            context.get::<Note>(1i64).await,
            Err(FixtureError::CollectionNotFound("notes".to_string()))
        );

        let fixed = StoreOptions::new("Server=memory;Database=partial_db")
            .migration(Migration::create_collections("001_half", &["notes"]));
        let context = MemoryStoreContext::connect(Arc::clone(&server), fixed).unwrap();
        context.migrate().await.unwrap();

        assert_eq!(
            server.applied_migrations("partial_db").await.unwrap(),
            vec!["001_half".to_string()]
        );
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);
        context.migrate().await.unwrap();

        context.add_range(&[note(1, "a"), note(2, "b")][..]).await.unwrap();
        context.save_changes().await.unwrap();

        context.update(&note(1, "changed")).await.unwrap();
        EntityStore::<Note>::remove(&context, &EntityKey::from(2i64)).await.unwrap();
        context.save_changes().await.unwrap();

        assert_eq!(context.all::<Note>().await.unwrap(), vec![note(1, "changed")]);
        assert_eq!(context.get::<Note>(2i64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unmigrated_collection_is_reported() {
        let server = Arc::new(MemoryServer::new());
        let options = StoreOptions::new("Server=memory;Database=empty_db");
        let context = MemoryStoreContext::connect(Arc::clone(&server), options).unwrap();
        context.migrate().await.unwrap();

        let result = context.get::<Note>(1i64).await;
        assert_eq!(result, Err(FixtureError::CollectionNotFound("notes".to_string())));
    }

    #[tokio::test]
    async fn test_ensure_deleted() {
        let server = Arc::new(MemoryServer::new());
        let context = create_test_context(&server);

        assert!(!context.ensure_deleted().await.unwrap());
        context.migrate().await.unwrap();
        assert!(server.database_exists("notes_db").await);

        assert!(context.ensure_deleted().await.unwrap());
        assert!(!server.database_exists("notes_db").await);
    }

    #[tokio::test]
    async fn test_failing_migration_keeps_earlier_ones() {
        let server = Arc::new(MemoryServer::new());
        let options = StoreOptions::new("Server=memory;Database=broken_db")
            .migration(Migration::create_collections("001_notes", &["notes"]))
            .migration(Migration::new("002_broken", |_| {
                Err(FixtureError::Store("syntax error".to_string()))
            }));
        let context = MemoryStoreContext::connect(Arc::clone(&server), options).unwrap();

        let err = context.migrate().await.unwrap_err();
        assert!(err.to_string().contains("002_broken"));
        assert_eq!(
            server.applied_migrations("broken_db").await.unwrap(),
            vec!["001_notes".to_string()]
        );
    }
}
