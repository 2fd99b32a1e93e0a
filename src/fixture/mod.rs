// ============================================================================
// Arrange / assert surface
// ============================================================================
//
// `StoreFixture` collects how a test wants its store prepared, `start` turns
// that into a ready `FixtureSession`, and the session offers the common
// database assertions on top of `AssertionQuery`.

use crate::assertion::{AssertionQuery, CollectionCheck, EntityCheck};
use crate::connection::NameValuePairFactory;
use crate::core::Result;
use crate::isolation::{IsolatedContextFactory, TestIdentity};
use crate::migration::{BootstrapCoordinator, FixtureOptions, MigrationRegistry};
use crate::store::{Entity, EntityKey, EntityStore, FromStoreOptions, StoreContext, StoreOptions};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

type Constructor<C> = Arc<dyn Fn(StoreOptions) -> Result<C> + Send + Sync>;
type Arrangement<C> = Box<dyn FnOnce(C) -> BoxFuture<'static, Result<()>> + Send>;
type Rebuild<C> = Arc<dyn Fn() -> Result<C> + Send + Sync>;

/// Declarative store setup for one test.
///
/// # Examples
///
/// ```
/// use rustmemodb_fixture::fixture::StoreFixture;
/// use rustmemodb_fixture::store::{Entity, EntityKey, MemoryStoreContext, Migration, StoreOptions};
///
/// #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// struct Item { id: i64, name: String }
///
/// impl Entity for Item {
///     const COLLECTION: &'static str = "items";
///     fn key(&self) -> EntityKey { self.id.into() }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> rustmemodb_fixture::Result<()> {
/// let options = StoreOptions::new("Server=memory;Database=doc_fixture")
///     .migration(Migration::create_collections("001_items", &["items"]));
///
/// let session = StoreFixture::<MemoryStoreContext>::new(options)
///     .having_isolated_database()
///     .having_entity(Item { id: 1, name: "Bacon".into() })
///     .start()
///     .await?;
///
/// session.should_exist(|item: &Item| item.name == "Bacon", vec![]).await?;
/// # Ok(())
/// # }
/// ```
pub struct StoreFixture<C> {
    options: StoreOptions,
    fixture_options: FixtureOptions,
    registry: Arc<MigrationRegistry>,
    identity: Option<String>,
    constructor: Constructor<C>,
    isolation: Option<Arc<IsolatedContextFactory<C>>>,
    arrangements: Vec<Arrangement<C>>,
}

impl<C> StoreFixture<C>
where
    C: StoreContext + Clone + FromStoreOptions,
{
    /// Fixture building its contexts through [`FromStoreOptions`]
    pub fn new(options: StoreOptions) -> Self {
        Self::with_constructor(options, C::from_options)
    }
}

impl<C> StoreFixture<C>
where
    C: StoreContext + Clone,
{
    /// Fixture building its contexts with `constructor`
    pub fn with_constructor<F>(options: StoreOptions, constructor: F) -> Self
    where
        F: Fn(StoreOptions) -> Result<C> + Send + Sync + 'static,
    {
        Self {
            options,
            fixture_options: FixtureOptions::default(),
            registry: Arc::clone(MigrationRegistry::global()),
            identity: TestIdentity::current(),
            constructor: Arc::new(constructor),
            isolation: None,
            arrangements: Vec::new(),
        }
    }

    /// Use `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<MigrationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace both mode flags at once
    pub fn with_fixture_options(mut self, options: FixtureOptions) -> Self {
        self.fixture_options = options;
        self
    }

    /// Drop the shared database before its first migration
    pub fn having_clean_database(mut self) -> Self {
        self.fixture_options.clean_database = true;
        self
    }

    /// Give this test its own database
    pub fn having_isolated_database(mut self) -> Self {
        self.fixture_options.isolated_database = true;
        self
    }

    /// Give this test its own database, built by `factory`
    pub fn having_isolated_database_with(mut self, factory: IsolatedContextFactory<C>) -> Self {
        self.fixture_options.isolated_database = true;
        self.isolation = Some(Arc::new(factory));
        self
    }

    /// Override the identity the isolated database is derived from
    pub fn having_test_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Arrange the store with arbitrary work run after bootstrap
    pub fn having<F, Fut>(mut self, arrange: F) -> Self
    where
        F: FnOnce(C) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.arrangements
            .push(Box::new(move |context| arrange(context).boxed()));
        self
    }

    pub fn having_entity<E>(self, entity: E) -> Self
    where
        E: Entity,
        C: EntityStore<E>,
    {
        self.having(move |context: C| async move { context.add(&entity).await })
    }

    pub fn having_entities<E>(self, entities: Vec<E>) -> Self
    where
        E: Entity,
        C: EntityStore<E>,
    {
        self.having(move |context: C| async move { context.add_range(&entities).await })
    }

    pub fn fixture_options(&self) -> &FixtureOptions {
        &self.fixture_options
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Acquire a context, bootstrap it and apply every arrangement.
    ///
    /// Arranged writes are saved once, after the last arrangement ran.
    pub async fn start(self) -> Result<FixtureSession<C>> {
        let rebuild = self.context_source()?;
        let context = rebuild()?;

        BootstrapCoordinator::new(Arc::clone(&self.registry), self.fixture_options)
            .bootstrap(&context)
            .await?;

        let arranged = self.arrangements.len();
        for arrange in self.arrangements {
            arrange(context.clone()).await?;
        }

        if arranged > 0 {
            let saved = context.save_changes().await?;
            debug!(arrangements = arranged, saved, "store arranged");
        }

        Ok(FixtureSession { context, rebuild })
    }

    fn context_source(&self) -> Result<Rebuild<C>> {
        if !self.fixture_options.isolated_database {
            let options = self.options.clone();
            let constructor = Arc::clone(&self.constructor);
            return Ok(Arc::new(move || constructor(options.clone())));
        }

        let factory = match &self.isolation {
            Some(factory) => Arc::clone(factory),
            None => {
                let constructor = Arc::clone(&self.constructor);
                Arc::new(IsolatedContextFactory::with_constructor(
                    self.options.clone(),
                    NameValuePairFactory::default(),
                    self.identity.clone(),
                    move |options| constructor(options),
                )?)
            }
        };

        info!(database = %factory.database_name(), "fixture uses an isolated database");
        Ok(Arc::new(move || factory.build()))
    }
}

/// A bootstrapped and arranged store, ready for the act and assert phases.
pub struct FixtureSession<C> {
    context: C,
    rebuild: Rebuild<C>,
}

impl<C: StoreContext> FixtureSession<C> {
    /// Context used during arrangement
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Fresh context bound to the same database
    pub fn new_context(&self) -> Result<C> {
        (self.rebuild)()
    }

    /// Configure an [`AssertionQuery`] and run it on a fresh context
    pub async fn should_satisfy_query<E, F>(&self, configure: F) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        F: FnOnce(&mut AssertionQuery<E>) -> Result<()>,
    {
        let mut query = AssertionQuery::new();
        configure(&mut query)?;

        let context = self.new_context()?;
        query.run(&context).await
    }

    /// Exactly one entity matches `predicate` and satisfies `checks`
    pub async fn should_exist<E, P>(&self, predicate: P, checks: Vec<EntityCheck<E>>) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_satisfy_query(|query| {
            query.filter(predicate).expect_single(checks);
            Ok(())
        })
        .await
    }

    pub async fn should_exist_with_key<E>(
        &self,
        key: impl Into<EntityKey>,
        checks: Vec<EntityCheck<E>>,
    ) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
    {
        let key = key.into();
        self.should_satisfy_query(|query| {
            query.find(key).expect_single(checks);
            Ok(())
        })
        .await
    }

    /// The entities matching `predicate` satisfy `checks`; with no checks, at
    /// least one entity matches
    pub async fn should_exist_many<E, P>(
        &self,
        predicate: P,
        checks: Vec<CollectionCheck<E>>,
    ) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_satisfy_query(|query| {
            query.filter(predicate).expect_many(checks);
            Ok(())
        })
        .await
    }

    pub async fn should_not_exist<E, P>(&self, predicate: P) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_satisfy_query(|query| {
            query.filter(predicate).expect_empty();
            Ok(())
        })
        .await
    }

    pub async fn should_not_exist_with_key<E>(&self, key: impl Into<EntityKey>) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
    {
        let key = key.into();
        self.should_satisfy_query(|query: &mut AssertionQuery<E>| {
            query.find(key).expect_empty();
            Ok(())
        })
        .await
    }

    pub async fn should_be_equivalent_with_key<E, T>(
        &self,
        key: impl Into<EntityKey>,
        expected: &T,
    ) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        T: Serialize,
    {
        let key = key.into();
        self.should_satisfy_query(|query: &mut AssertionQuery<E>| {
            query.find(key).expect_equivalent_to(expected);
            Ok(())
        })
        .await
    }

    /// Exactly one entity matches `predicate` and it is equivalent to `expected`
    pub async fn should_be_equivalent<E, P, T>(&self, predicate: P, expected: &T) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        P: Fn(&E) -> bool + Send + Sync + 'static,
        T: Serialize,
    {
        self.should_satisfy_query(|query| {
            query.filter(predicate).expect_equivalent_to(expected);
            Ok(())
        })
        .await
    }

    pub async fn should_contain_equivalent<E, T>(&self, expected: &T) -> Result<()>
    where
        E: Entity,
        C: EntityStore<E>,
        T: Serialize,
    {
        self.should_satisfy_query(|query: &mut AssertionQuery<E>| {
            query.expect_contains_equivalent(expected);
            Ok(())
        })
        .await
    }
}
