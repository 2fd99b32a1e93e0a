use serde::Deserialize;

/// How a fixture prepares its store
///
/// Similar to the `ConnectionConfig` builder: construct with defaults, then
/// override with the fluent setters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FixtureOptions {
    /// Give every test its own database, provisioned from scratch
    pub isolated_database: bool,

    /// Drop the shared database before migrating it (shared mode only)
    pub clean_database: bool,
}

impl FixtureOptions {
    pub const ISOLATED_DATABASE_ENV: &'static str = "FIXTURE_ISOLATED_DATABASE";
    pub const CLEAN_DATABASE_ENV: &'static str = "FIXTURE_CLEAN_DATABASE";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set isolated mode
    pub fn isolated_database(mut self, isolated: bool) -> Self {
        self.isolated_database = isolated;
        self
    }

    /// Set clean-before-migrate
    pub fn clean_database(mut self, clean: bool) -> Self {
        self.clean_database = clean;
        self
    }

    /// Defaults overridden by `FIXTURE_ISOLATED_DATABASE` and
    /// `FIXTURE_CLEAN_DATABASE` (`1`, `true` or `yes`)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            lookup(name)
                .map(|value| {
                    matches!(
                        value.trim().to_ascii_lowercase().as_str(),
                        "1" | "true" | "yes"
                    )
                })
                .unwrap_or(false)
        };

        Self {
            isolated_database: flag(Self::ISOLATED_DATABASE_ENV),
            clean_database: flag(Self::CLEAN_DATABASE_ENV),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_shared_without_clean() {
        let options = FixtureOptions::default();
        assert!(!options.isolated_database);
        assert!(!options.clean_database);
    }

    #[test]
    fn test_builder_pattern() {
        let options = FixtureOptions::new().isolated_database(true).clean_database(true);
        assert!(options.isolated_database);
        assert!(options.clean_database);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (FixtureOptions::ISOLATED_DATABASE_ENV, " TRUE "),
            (FixtureOptions::CLEAN_DATABASE_ENV, "0"),
        ]);
        let options = FixtureOptions::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert!(options.isolated_database);
        assert!(!options.clean_database);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let options: FixtureOptions = serde_json::from_str(r#"{"clean_database": true}"#).unwrap();

        assert_eq!(options, FixtureOptions::new().clean_database(true));
    }
}
