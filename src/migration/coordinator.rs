use super::options::FixtureOptions;
use super::registry::MigrationRegistry;
use crate::connection::redact;
use crate::core::{FixtureError, Result};
use crate::store::StoreContext;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMode {
    /// Every test on a connection descriptor shares one migration outcome
    Shared,
    /// Every acquisition drops, recreates and migrates its own database
    Isolated,
}

/// Progress of a single acquisition, reported through tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Start,
    Registered,
    Provisioning,
    Ready,
    Failed,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Registered => "registered",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Makes a store schema-ready before a test touches it.
///
/// In shared mode the work goes through the [`MigrationRegistry`] keyed by the
/// context's connection descriptor, so it runs once per descriptor. In
/// isolated mode every call provisions its own database and nothing is cached.
/// Failures are reported to the caller and never retried here.
pub struct BootstrapCoordinator {
    registry: Arc<MigrationRegistry>,
    options: FixtureOptions,
}

impl BootstrapCoordinator {
    pub fn new(registry: Arc<MigrationRegistry>, options: FixtureOptions) -> Self {
        Self { registry, options }
    }

    /// Coordinator backed by [`MigrationRegistry::global`]
    pub fn with_global_registry(options: FixtureOptions) -> Self {
        Self::new(Arc::clone(MigrationRegistry::global()), options)
    }

    pub fn mode(&self) -> BootstrapMode {
        if self.options.isolated_database {
            BootstrapMode::Isolated
        } else {
            BootstrapMode::Shared
        }
    }

    pub fn options(&self) -> &FixtureOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<MigrationRegistry> {
        &self.registry
    }

    /// Bring the store behind `context` to the latest schema
    pub async fn bootstrap<C>(&self, context: &C) -> Result<()>
    where
        C: StoreContext + Clone,
    {
        let descriptor = redact(context.connection_descriptor());
        transition(&descriptor, BootstrapState::Start);

        let outcome = match self.mode() {
            BootstrapMode::Shared => self.migrate_shared(context, &descriptor).await,
            BootstrapMode::Isolated => {
                transition(&descriptor, BootstrapState::Provisioning);
                provision(context.clone(), true).await
            }
        };

        match &outcome {
            Ok(()) => transition(&descriptor, BootstrapState::Ready),
            Err(_) => transition(&descriptor, BootstrapState::Failed),
        }
        outcome
    }

    async fn migrate_shared<C>(&self, context: &C, descriptor: &str) -> Result<()>
    where
        C: StoreContext + Clone,
    {
        let clean = self.options.clean_database;
        let owned = context.clone();

        let handle = self
            .registry
            .get_or_start(context.connection_descriptor(), move || provision(owned, clean))?;
        transition(descriptor, BootstrapState::Registered);

        handle.await
    }
}

async fn provision<C: StoreContext>(context: C, clean: bool) -> Result<()> {
    info!(
        "Migrating database for connection string: {}",
        redact(context.connection_descriptor())
    );

    if clean {
        info!("Deleting database");
        context.ensure_deleted().await.map_err(provisioning_failure)?;
    }

    context.migrate().await.map_err(provisioning_failure)
}

fn provisioning_failure(err: FixtureError) -> FixtureError {
    match err {
        FixtureError::Provisioning(_) => err,
        other => FixtureError::Provisioning(other.to_string()),
    }
}

fn transition(descriptor: &str, state: BootstrapState) {
    debug!(connection = %descriptor, state = %state, "bootstrap");
}
