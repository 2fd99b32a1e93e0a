use super::migration::Migration;
use crate::core::{FixtureError, Result};
use std::time::Duration;

/// Store configuration
///
/// The connection descriptor is the only facet the isolated-database factory
/// rewrites; everything else is carried over to every context built from it.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Raw connection descriptor, e.g. `Server=memory;Database=orders`
    pub connection_string: String,

    /// Schema changes applied by `migrate`, in order
    pub migrations: Vec<Migration>,

    /// Upper bound for a single store command
    pub command_timeout: Option<Duration>,

    /// Include entity values in store logs
    pub sensitive_data_logging: bool,
}

impl StoreOptions {
    pub fn new(connection_string: &str) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            ..Self::default()
        }
    }

    /// Replace the connection descriptor
    pub fn connection(mut self, connection_string: &str) -> Self {
        self.connection_string = connection_string.to_string();
        self
    }

    /// Add a migration
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Add several migrations
    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations);
        self
    }

    /// Set the command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.sensitive_data_logging = enabled;
        self
    }

    /// Copy of these options with only the connection descriptor replaced
    pub fn with_connection(&self, connection_string: &str) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(FixtureError::Configuration(
                "store options have no connection string".to_string(),
            ));
        }

        if self.command_timeout == Some(Duration::ZERO) {
            return Err(FixtureError::Configuration(
                "command_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
