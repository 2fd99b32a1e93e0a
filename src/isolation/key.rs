use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::info;
use uuid::Uuid;

/// Maps a test identity to a stable 128-bit database identifier.
///
/// The same identity always yields the same key, so re-running a test reuses
/// its database instead of leaking a new one per run. Without an identity the
/// deriver hands out one random key, generated on first use and reused for the
/// rest of its lifetime.
#[derive(Debug, Default)]
pub struct IsolationKeyDeriver {
    fallback: OnceLock<Uuid>,
}

impl IsolationKeyDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `identity`, or the cached fallback when absent or empty
    pub fn derive(&self, identity: Option<&str>) -> Uuid {
        let key = match identity.filter(|name| !name.is_empty()) {
            Some(name) => Self::hash_identity(name),
            None => *self.fallback.get_or_init(Uuid::new_v4),
        };

        info!(isolation_key = %key, identity = identity.unwrap_or("<none>"), "derived isolation key");
        key
    }

    /// First 128 bits of SHA-256 over the UTF-8 bytes of `identity`
    pub fn hash_identity(identity: &str) -> Uuid {
        let digest = Sha256::digest(identity.as_bytes());

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }
}

/// Identity of the currently running test.
pub struct TestIdentity;

impl TestIdentity {
    /// Name of the running test.
    ///
    /// The Rust test harness names each test thread after the test's path
    /// (`module::tests::test_name`). `#[tokio::test]` bodies run on that
    /// thread too. Returns `None` on the main thread, on unnamed threads and
    /// on runtime worker threads, where the name says nothing about the test.
    pub fn current() -> Option<String> {
        let thread = std::thread::current();
        let name = thread.name()?;

        if name == "main" || name.starts_with("tokio-runtime-worker") {
            return None;
        }

        Some(name.to_string())
    }
}
