use crate::connection::redact;
use crate::core::{FixtureError, Result};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock, RwLock};
use tokio::runtime::Runtime;
use tracing::debug;

/// Awaitable outcome of one bootstrap. Clones resolve to the same result.
pub type MigrationHandle = Shared<BoxFuture<'static, Result<()>>>;

// Global singleton instance of MigrationRegistry
lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<MigrationRegistry> = Arc::new(MigrationRegistry::new());
}

/// Single-flight cache of bootstrap work, keyed by connection descriptor.
///
/// For a given key the work factory runs at most once over the registry's
/// lifetime. Every caller, concurrent or later, receives a clone of the same
/// handle and so observes the same success or failure. Failures stay cached
/// until the key is explicitly [evicted](MigrationRegistry::evict).
///
/// The work runs on a runtime owned by the registry, started on first use.
/// It is not tied to any caller's runtime, so it runs to completion even when
/// every caller stops awaiting its handle and their runtimes shut down.
pub struct MigrationRegistry {
    handles: RwLock<HashMap<String, MigrationHandle>>,
    runtime: OnceLock<Runtime>,
}

impl MigrationRegistry {
    /// Get the global MigrationRegistry instance
    ///
    /// Shared by every fixture that does not bring its own registry.
    pub fn global() -> &'static Arc<MigrationRegistry> {
        &GLOBAL_REGISTRY
    }

    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            runtime: OnceLock::new(),
        }
    }

    /// Handle for `key`, starting `work` only if no handle exists yet.
    ///
    /// The returned handle can be awaited from any runtime or executor.
    ///
    /// # Examples
    ///
    /// ```
    /// use rustmemodb_fixture::migration::MigrationRegistry;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> rustmemodb_fixture::Result<()> {
    /// let registry = MigrationRegistry::new();
    ///
    /// let first = registry.get_or_start("Database=orders", || async { Ok(()) })?;
    /// let second = registry.get_or_start("Database=orders", || async { Ok(()) })?;
    ///
    /// first.await?;
    /// second.await?;
    /// assert_eq!(registry.len()?, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_or_start<F, Fut>(&self, key: &str, work: F) -> Result<MigrationHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Fast path: already registered
        if let Some(handle) = self.handles.read()?.get(key) {
            debug!(key = %redact(key), "migration already registered");
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write()?;

        // Check again, another caller may have registered while we waited
        if let Some(handle) = handles.get(key) {
            debug!(key = %redact(key), "migration registered concurrently");
            return Ok(handle.clone());
        }

        let task = self.runtime()?.spawn(work());
        let handle = async move {
            task.await.map_err(|e| {
                FixtureError::Provisioning(format!("migration task did not complete: {}", e))
            })?
        }
        .boxed()
        .shared();

        handles.insert(key.to_string(), handle.clone());
        debug!(key = %redact(key), "migration started");

        Ok(handle)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.handles.read()?.contains_key(key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.handles.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.handles.read()?.is_empty())
    }

    /// Forget the handle for `key` so the next caller starts fresh work.
    ///
    /// Waiters already holding the old handle still observe its outcome.
    pub fn evict(&self, key: &str) -> Result<bool> {
        let removed = self.handles.write()?.remove(key).is_some();
        if removed {
            debug!(key = %redact(key), "migration evicted");
        }
        Ok(removed)
    }

    fn runtime(&self) -> Result<&Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }

        let built = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("migration-registry")
            .enable_all()
            .build()
            .map_err(|e| {
                FixtureError::Configuration(format!("cannot start migration runtime: {}", e))
            })?;

        if let Err(unused) = self.runtime.set(built) {
            unused.shutdown_background();
        }

        self.runtime.get().ok_or_else(|| {
            FixtureError::Configuration("migration runtime is unavailable".to_string())
        })
    }
}

impl Drop for MigrationRegistry {
    fn drop(&mut self) {
        // Registries are often dropped inside async tests, where a blocking
        // shutdown would panic
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
