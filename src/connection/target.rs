use super::{ConnectionTarget, ConnectionTargetFactory};
use std::fmt;

const SECRET_KEYS: &[&str] = &["Password", "Pwd"];

/// Factory for `key=value;key=value` style connection descriptors.
///
/// Separator, equality character and the key of the database facet are
/// configurable; the defaults match ADO-style descriptors such as
/// `Server=localhost;Database=orders;User Id=sa`.
///
/// # Examples
///
/// ```
/// use rustmemodb_fixture::connection::{ConnectionTarget, NameValuePairFactory};
///
/// let factory = NameValuePairFactory::default();
/// let mut target = factory.parse("Server=db;Database=orders;User=x");
/// target.set_database("orders_test");
///
/// assert_eq!(target.serialize(), "Server=db;Database=orders_test;User=x");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValuePairFactory {
    separator: char,
    equality: char,
    database_key: String,
}

impl NameValuePairFactory {
    pub const DEFAULT_SEPARATOR: char = ';';
    pub const DEFAULT_EQUALITY: char = '=';
    pub const DEFAULT_DATABASE_KEY: &'static str = "Database";

    pub fn new(separator: char, equality: char, database_key: &str) -> Self {
        Self {
            separator,
            equality,
            database_key: database_key.to_string(),
        }
    }

    /// Set the separator between pairs
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Set the character between a key and its value
    pub fn equality(mut self, equality: char) -> Self {
        self.equality = equality;
        self
    }

    /// Set the key that names the database
    pub fn database_key(mut self, key: &str) -> Self {
        self.database_key = key.to_string();
        self
    }

    /// Parse a raw descriptor into a concrete target.
    ///
    /// Malformed tokens never fail the parse, they are dropped:
    /// empty tokens, tokens without a value, and tokens with an empty key.
    /// When a key repeats, the first occurrence is kept.
    pub fn parse(&self, raw: &str) -> NameValuePairTarget {
        let mut pairs: Vec<(String, String)> = Vec::new();

        for token in raw.split(self.separator).filter(|t| !t.is_empty()) {
            let Some((key, value)) = token.split_once(self.equality) else {
                continue;
            };

            let key = key.trim();
            let value = value.trim();

            if key.is_empty() || value.is_empty() {
                continue;
            }

            // First occurrence wins
            if pairs.iter().any(|(existing, _)| existing == key) {
                continue;
            }

            pairs.push((key.to_string(), value.to_string()));
        }

        NameValuePairTarget {
            pairs,
            separator: self.separator,
            equality: self.equality,
            database_key: self.database_key.clone(),
        }
    }
}

impl Default for NameValuePairFactory {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_SEPARATOR,
            Self::DEFAULT_EQUALITY,
            Self::DEFAULT_DATABASE_KEY,
        )
    }
}

impl ConnectionTargetFactory for NameValuePairFactory {
    fn build(&self, raw: &str) -> Box<dyn ConnectionTarget> {
        Box::new(self.parse(raw))
    }
}

/// Ordered name/value pairs parsed from a connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValuePairTarget {
    pairs: Vec<(String, String)>,
    separator: char,
    equality: char,
    database_key: String,
}

impl NameValuePairTarget {
    /// Retained pairs in their original order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Serialized form with secrets masked, for logging
    pub fn redacted(&self) -> String {
        let mut copy = self.clone();
        for (key, value) in copy.pairs.iter_mut() {
            if SECRET_KEYS.iter().any(|secret| key.eq_ignore_ascii_case(secret)) {
                *value = "***".to_string();
            }
        }
        copy.to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl ConnectionTarget for NameValuePairTarget {
    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    fn database(&self) -> Option<&str> {
        self.get(&self.database_key)
    }

    fn set_database(&mut self, database: &str) {
        let key = self.database_key.clone();
        self.set(&key, database);
    }
}

impl fmt::Display for NameValuePairTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.separator)?;
            }
            write!(f, "{}{}{}", key, self.equality, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let raw = "Server=localhost;Database=orders;User Id=sa;Password=secret";
        let target = NameValuePairFactory::default().parse(raw);

        assert_eq!(target.serialize(), raw);
        assert_eq!(target.len(), 4);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let target = NameValuePairFactory::default().parse(" Server = db ; Database= orders ");

        assert_eq!(target.get("Server"), Some("db"));
        assert_eq!(target.database(), Some("orders"));
        assert_eq!(target.serialize(), "Server=db;Database=orders");
    }

    #[test]
    fn test_duplicates_and_empty_values_are_dropped() {
        let target = NameValuePairFactory::default().parse("A=1;A=2;B=");

        assert_eq!(target.len(), 1);
        assert_eq!(target.get("A"), Some("1"));
        assert_eq!(target.get("B"), None);
        assert_eq!(target.serialize(), "A=1");
    }

    #[test]
    fn test_malformed_tokens_are_dropped() {
        let target = NameValuePairFactory::default().parse(";;Flag;=orphan;Server=db;;");

        assert_eq!(target.serialize(), "Server=db");
    }

    #[test]
    fn test_value_may_contain_equality() {
        let target = NameValuePairFactory::default().parse("Password=a=b;Server=db");

        assert_eq!(target.get("Password"), Some("a=b"));
        assert_eq!(target.serialize(), "Password=a=b;Server=db");
    }

    #[test]
    fn test_set_database_preserves_position() {
        let mut target = NameValuePairFactory::default().parse("Server=db;Database=orders;User=x");
        target.set_database("orders_test");

        assert_eq!(target.serialize(), "Server=db;Database=orders_test;User=x");
    }

    #[test]
    fn test_set_database_appends_when_missing() {
        let mut target = NameValuePairFactory::default().parse("Server=db");
        assert_eq!(target.database(), None);

        target.set_database("x");
        assert_eq!(target.serialize(), "Server=db;Database=x");
    }

    #[test]
    fn test_redacted_hides_password() {
        let target = NameValuePairFactory::default().parse("Server=db;User=sa;password=secret123");
        let redacted = target.redacted();

        assert!(!redacted.contains("secret123"));
        assert_eq!(redacted, "Server=db;User=sa;password=***");
        assert_eq!(target.get("password"), Some("secret123"));
    }

    #[test]
    fn test_custom_characters() {
        let factory = NameValuePairFactory::default()
            .separator('&')
            .equality(':')
            .database_key("dbname");

        let mut target = factory.parse("host:db&dbname:orders");
        assert_eq!(target.database(), Some("orders"));

        target.set_database("orders_1");
        assert_eq!(target.serialize(), "host:db&dbname:orders_1");
    }

    #[test]
    fn test_build_through_trait_object() {
        let factory: Box<dyn ConnectionTargetFactory> = Box::new(NameValuePairFactory::default());
        let mut target = factory.build("Server=db;Database=a");
        target.set_database("b");

        assert_eq!(target.to_string(), "Server=db;Database=b");
    }
}
