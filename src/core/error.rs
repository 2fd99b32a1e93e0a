use thiserror::Error;

/// Errors raised by the fixture layer.
///
/// The enum is `Clone` because a single provisioning outcome is handed to every
/// waiter of a shared migration handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    #[error("Usage error: this query source is already configured")]
    AlreadyConfigured,

    #[error("Usage error: incompatible query configuration: {0}")]
    IncompatibleConfiguration(String),

    #[error("Usage error: no assertions added to this query")]
    NoAssertions,

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Assertion failed: {message} (expected: {expected}, actual: {actual})")]
    Assertion {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, FixtureError>;

impl FixtureError {
    /// Builds an assertion failure carrying expected and actual detail.
    pub fn assertion(
        message: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::Assertion {
            message: message.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Builder misuse, detected before any store I/O.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyConfigured
                | Self::IncompatibleConfiguration(_)
                | Self::NoAssertions
        )
    }

    pub fn is_provisioning_failure(&self) -> bool {
        matches!(self, Self::Provisioning(_))
    }

    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, Self::Assertion { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for FixtureError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<serde_json::Error> for FixtureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("entity serialization failed: {}", err))
    }
}
