/// Connection target tests
///
/// Parsing, rewriting and re-serializing name/value connection descriptors
/// Run with: cargo test --test connection_target_tests

use proptest::prelude::*;
use rustmemodb_fixture::connection::redact;
use rustmemodb_fixture::{ConnectionTarget, ConnectionTargetFactory, NameValuePairFactory};
use std::collections::BTreeMap;

#[test]
fn test_database_facet_rewrite_keeps_other_pairs() {
    let factory = NameValuePairFactory::default();
    let mut target = factory.parse("Server=localhost;Database=orders;Trusted_Connection=True");

    target.set_database("d1c0ffee");

    assert_eq!(
        target.serialize(),
        "Server=localhost;Database=d1c0ffee;Trusted_Connection=True"
    );
}

#[test]
fn test_missing_database_is_appended() {
    let mut target = NameValuePairFactory::default().parse("Server=localhost");

    assert_eq!(target.database(), None);
    target.set_database("fresh");

    assert_eq!(target.serialize(), "Server=localhost;Database=fresh");
}

#[test]
fn test_lenient_parsing() {
    let target = NameValuePairFactory::default().parse(";;Server = db ;junk;=orphan;Empty=;A=1;A=2");

    assert_eq!(
        target.pairs().collect::<Vec<_>>(),
        vec![("Server", "db"), ("A", "1")]
    );
}

#[test]
fn test_custom_format_through_trait_object() {
    let factory: Box<dyn ConnectionTargetFactory> = Box::new(
        NameValuePairFactory::default()
            .separator('&')
            .equality(':')
            .database_key("db"),
    );

    let mut target = factory.build("host:pg&db:app&sslmode:require");
    assert_eq!(target.database(), Some("app"));

    target.set_database("app_test");
    assert_eq!(target.to_string(), "host:pg&db:app_test&sslmode:require");
}

#[test]
fn test_redact_masks_passwords() {
    assert_eq!(
        redact("Server=db;Database=orders;Password=hunter2;pwd=x"),
        "Server=db;Database=orders;Password=***;pwd=***"
    );
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,8}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.-]{1,12}"
}

proptest! {
    #[test]
    fn prop_well_formed_descriptors_round_trip(
        pairs in prop::collection::btree_map(key_strategy(), value_strategy(), 0..8)
    ) {
        let raw = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";");

        let target = NameValuePairFactory::default().parse(&raw);
        prop_assert_eq!(target.serialize(), raw);
        prop_assert_eq!(target.len(), pairs.len());
    }

    #[test]
    fn prop_first_occurrence_wins(
        pairs in prop::collection::vec(("[A-C]", value_strategy()), 0..12)
    ) {
        let raw = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";");

        let mut first: BTreeMap<&str, &str> = BTreeMap::new();
        for (k, v) in &pairs {
            first.entry(k.as_str()).or_insert(v.as_str());
        }

        let target = NameValuePairFactory::default().parse(&raw);
        prop_assert_eq!(target.len(), first.len());
        for (k, v) in first {
            prop_assert_eq!(target.get(k), Some(v));
        }
    }

    #[test]
    fn prop_set_database_only_touches_database(
        pairs in prop::collection::btree_map(key_strategy(), value_strategy(), 0..8),
        database in value_strategy()
    ) {
        let raw = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";");

        let mut target = NameValuePairFactory::default().parse(&raw);
        target.set_database(&database);

        prop_assert_eq!(target.database(), Some(database.as_str()));
        for (k, v) in pairs.iter().filter(|(k, _)| k.as_str() != "Database") {
            prop_assert_eq!(target.get(k), Some(v.as_str()));
        }
    }
}
