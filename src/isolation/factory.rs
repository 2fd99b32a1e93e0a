use super::key::{IsolationKeyDeriver, TestIdentity};
use crate::connection::{ConnectionTargetFactory, NameValuePairFactory};
use crate::core::Result;
use crate::store::{FromStoreOptions, StoreOptions};
use std::sync::Arc;
use tracing::info;

type Constructor<C> = Arc<dyn Fn(StoreOptions) -> Result<C> + Send + Sync>;

/// Builds store contexts bound to a per-test database.
///
/// Every context shares the base options except for the connection
/// descriptor, whose database facet is replaced with the isolation key of the
/// test identity. All contexts built by one factory point at the same
/// database.
pub struct IsolatedContextFactory<C> {
    base: StoreOptions,
    targets: Box<dyn ConnectionTargetFactory>,
    deriver: IsolationKeyDeriver,
    identity: Option<String>,
    constructor: Constructor<C>,
}

impl<C: FromStoreOptions + 'static> IsolatedContextFactory<C> {
    /// Factory constructing contexts through [`FromStoreOptions`].
    ///
    /// Fails with a configuration error when `base` is unusable, so a broken
    /// setup is reported once at construction rather than on every `build`.
    pub fn new(
        base: StoreOptions,
        targets: impl ConnectionTargetFactory + 'static,
        identity: Option<String>,
    ) -> Result<Self> {
        Self::with_constructor(base, targets, identity, C::from_options)
    }

    /// Factory for the running test with the default descriptor format
    pub fn for_current_test(base: StoreOptions) -> Result<Self> {
        Self::new(base, NameValuePairFactory::default(), TestIdentity::current())
    }
}

impl<C> IsolatedContextFactory<C> {
    /// Factory constructing contexts with an explicit constructor
    pub fn with_constructor<F>(
        base: StoreOptions,
        targets: impl ConnectionTargetFactory + 'static,
        identity: Option<String>,
        constructor: F,
    ) -> Result<Self>
    where
        F: Fn(StoreOptions) -> Result<C> + Send + Sync + 'static,
    {
        base.validate()?;

        Ok(Self {
            base,
            targets: Box::new(targets),
            deriver: IsolationKeyDeriver::new(),
            identity,
            constructor: Arc::new(constructor),
        })
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Database name every context of this factory is bound to
    pub fn database_name(&self) -> String {
        self.deriver.derive(self.identity.as_deref()).to_string()
    }

    /// Base connection descriptor with the database facet rewritten
    pub fn connection_descriptor(&self) -> String {
        self.rewrite(&self.database_name())
    }

    /// Build a new context bound to the isolated database
    pub fn build(&self) -> Result<C> {
        let database = self.database_name();
        info!(database = %database, "using isolated database");

        (self.constructor)(self.base.with_connection(&self.rewrite(&database)))
    }

    fn rewrite(&self, database: &str) -> String {
        let mut target = self.targets.build(&self.base.connection_string);
        target.set_database(database);
        target.serialize()
    }
}
