pub mod target;

use std::fmt;

pub use target::{NameValuePairFactory, NameValuePairTarget};

/// Structured, re-serializable view of a store connection descriptor.
///
/// The database facet is what isolation rewrites; every other entry in the
/// descriptor is carried through untouched.
pub trait ConnectionTarget: fmt::Display + fmt::Debug + Send + Sync {
    /// Value stored under `key`, if any
    fn get(&self, key: &str) -> Option<&str>;

    /// Update `key` in place, or append it when absent
    fn set(&mut self, key: &str, value: &str);

    /// Database name, when the descriptor carries one
    fn database(&self) -> Option<&str>;

    /// Replace the database name, appending it when absent
    fn set_database(&mut self, database: &str);

    /// Descriptor string suitable for connecting
    fn serialize(&self) -> String {
        self.to_string()
    }
}

/// Descriptor with secrets masked, for log output
pub fn redact(raw: &str) -> String {
    NameValuePairFactory::default().parse(raw).redacted()
}

/// Parses raw descriptors into [`ConnectionTarget`]s.
pub trait ConnectionTargetFactory: Send + Sync {
    fn build(&self, raw: &str) -> Box<dyn ConnectionTarget>;
}
