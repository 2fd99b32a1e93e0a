// ============================================================================
// Deferred store assertions
// ============================================================================

pub mod equivalence;

use crate::core::{FixtureError, Result};
use crate::store::{Entity, EntityKey, EntityStore, Query};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Check over one entity of a materialized result
pub type EntityCheck<E> = Box<dyn Fn(&E) -> Result<()> + Send + Sync>;

/// Check over the whole materialized result
pub type CollectionCheck<E> = Box<dyn Fn(&[E]) -> Result<()> + Send + Sync>;

type QueryTransform<E> = Box<dyn FnOnce(Query<E>) -> Query<E> + Send>;

/// Box an entity check
pub fn check<E, F>(f: F) -> EntityCheck<E>
where
    F: Fn(&E) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Box a collection check
pub fn collection_check<E, F>(f: F) -> CollectionCheck<E>
where
    F: Fn(&[E]) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Compare two values, producing an assertion failure on mismatch
pub fn expect_eq<T>(what: &str, actual: &T, expected: &T) -> Result<()>
where
    T: PartialEq + Debug + ?Sized,
{
    if actual == expected {
        Ok(())
    } else {
        Err(FixtureError::assertion(
            what,
            format!("{:?}", expected),
            format!("{:?}", actual),
        ))
    }
}

/// A store query declared now and verified later.
///
/// The builder collects how to read the collection of `E` (a source
/// transform and filters, or a key lookup) and the post-conditions the result
/// must satisfy. [`run`](AssertionQuery::run) performs exactly one read and
/// checks every post-condition against that snapshot, reporting the first
/// failure.
///
/// # Examples
///
/// ```no_run
/// # use rustmemodb_fixture::assertion::{AssertionQuery, check, expect_eq};
/// # use rustmemodb_fixture::store::{Entity, EntityKey, MemoryStoreContext};
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// # struct Item { id: i64, name: String }
/// # impl Entity for Item {
/// #     const COLLECTION: &'static str = "items";
/// #     fn key(&self) -> EntityKey { self.id.into() }
/// # }
/// # async fn example(context: MemoryStoreContext) -> rustmemodb_fixture::Result<()> {
/// let mut query = AssertionQuery::<Item>::new();
/// query
///     .filter(|item| item.name.starts_with("B"))
///     .expect_single(vec![check(|item: &Item| expect_eq("name", item.name.as_str(), "Bacon"))]);
///
/// query.run(&context).await
/// # }
/// ```
pub struct AssertionQuery<E: Entity> {
    source: Option<QueryTransform<E>>,
    steps: Vec<QueryTransform<E>>,
    key: Option<EntityKey>,
    conditions: Vec<CollectionCheck<E>>,
}

impl<E: Entity> AssertionQuery<E> {
    pub fn new() -> Self {
        Self {
            source: None,
            steps: Vec::new(),
            key: None,
            conditions: Vec::new(),
        }
    }

    /// Set the base query the filters build on. Only one source is allowed.
    pub fn with_source<F>(&mut self, configure: F) -> Result<&mut Self>
    where
        F: FnOnce(Query<E>) -> Query<E> + Send + 'static,
    {
        if self.source.is_some() {
            return Err(FixtureError::AlreadyConfigured);
        }
        self.source = Some(Box::new(configure));
        Ok(self)
    }

    /// Append an arbitrary query transform
    pub fn matching<F>(&mut self, transform: F) -> &mut Self
    where
        F: FnOnce(Query<E>) -> Query<E> + Send + 'static,
    {
        self.steps.push(Box::new(transform));
        self
    }

    /// Append a filter predicate
    pub fn filter<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.matching(move |query| query.filter(predicate))
    }

    /// Look up a single entity by key instead of querying
    pub fn find(&mut self, key: impl Into<EntityKey>) -> &mut Self {
        self.key = Some(key.into());
        self
    }

    /// The result must be empty
    pub fn expect_empty(&mut self) -> &mut Self {
        self.conditions.push(Box::new(|entities: &[E]| {
            if entities.is_empty() {
                Ok(())
            } else {
                Err(FixtureError::assertion(
                    "expected an empty result",
                    0,
                    entities.len(),
                ))
            }
        }));
        self
    }

    /// The result must hold exactly one entity satisfying every check
    pub fn expect_single(&mut self, checks: Vec<EntityCheck<E>>) -> &mut Self {
        if checks.is_empty() {
            self.conditions
                .push(Box::new(|entities: &[E]| single(entities).map(|_| ())));
            return self;
        }

        for entity_check in checks {
            self.conditions.push(Box::new(move |entities: &[E]| {
                let entity = single(entities)?;
                entity_check(entity)
            }));
        }
        self
    }

    /// Raw post-conditions over the result. No checks means non-empty.
    pub fn expect_collection(&mut self, checks: Vec<CollectionCheck<E>>) -> &mut Self {
        if checks.is_empty() {
            self.conditions.push(Box::new(|entities: &[E]| {
                if entities.is_empty() {
                    Err(FixtureError::assertion(
                        "expected a non-empty result",
                        "at least 1",
                        0,
                    ))
                } else {
                    Ok(())
                }
            }));
            return self;
        }

        self.conditions.extend(checks);
        self
    }

    /// The result must satisfy every check, or be non-empty when none are given
    pub fn expect_many(&mut self, checks: Vec<CollectionCheck<E>>) -> &mut Self {
        self.expect_collection(checks)
    }

    /// The result must hold exactly one entity equivalent to `expected`
    pub fn expect_equivalent_to<T: Serialize>(&mut self, expected: &T) -> &mut Self {
        let expected = equivalence::to_value(expected);
        self.expect_single(vec![check(move |entity: &E| {
            let expected = expected.clone()?;
            let actual = equivalence::to_value(entity)?;
            if equivalence::is_equivalent(&actual, &expected) {
                Ok(())
            } else {
                Err(FixtureError::assertion(
                    "entity is not equivalent",
                    equivalence::describe(&expected),
                    equivalence::describe(&actual),
                ))
            }
        })])
    }

    /// Some entity of the result must be equivalent to `expected`
    pub fn expect_contains_equivalent<T: Serialize>(&mut self, expected: &T) -> &mut Self {
        let expected = equivalence::to_value(expected);
        self.conditions.push(Box::new(move |entities: &[E]| {
            let expected = expected.clone()?;
            let actual = to_values(entities)?;
            if actual
                .iter()
                .any(|actual| equivalence::is_equivalent(actual, &expected))
            {
                Ok(())
            } else {
                Err(FixtureError::assertion(
                    "no entity in the result is equivalent",
                    equivalence::describe(&expected),
                    Value::Array(actual),
                ))
            }
        }));
        self
    }

    /// Every value of `expected` must have an equivalent entity in the result
    pub fn expect_contains_all_equivalent<T: Serialize>(&mut self, expected: &[T]) -> &mut Self {
        for value in expected {
            self.expect_contains_equivalent(value);
        }
        self
    }

    /// The result must pair one-to-one with `expected`, in any order
    pub fn expect_equivalent_collection<T: Serialize>(&mut self, expected: &[T]) -> &mut Self {
        let expected = expected
            .iter()
            .map(equivalence::to_value)
            .collect::<Result<Vec<Value>>>();
        self.conditions.push(Box::new(move |entities: &[E]| {
            let expected = expected.clone()?;
            let actual = to_values(entities)?;
            if equivalence::is_equivalent_collection(&actual, &expected) {
                Ok(())
            } else {
                Err(FixtureError::assertion(
                    "result is not equivalent to the expected collection",
                    Value::Array(expected),
                    Value::Array(actual),
                ))
            }
        }));
        self
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// Read the store once and verify every post-condition.
    ///
    /// Builder misuse is reported before the store is touched.
    pub async fn run<S>(self, store: &S) -> Result<()>
    where
        S: EntityStore<E> + ?Sized,
    {
        if self.key.is_some() {
            if self.source.is_some() {
                return Err(FixtureError::IncompatibleConfiguration(
                    "cannot configure a find query".to_string(),
                ));
            }
            if !self.steps.is_empty() {
                return Err(FixtureError::IncompatibleConfiguration(
                    "cannot filter a find query".to_string(),
                ));
            }
        }

        if self.conditions.is_empty() {
            return Err(FixtureError::NoAssertions);
        }

        let entities = match self.key {
            Some(key) => store.find(&key).await?.into_iter().collect::<Vec<E>>(),
            None => {
                let base = Query::all();
                let configured = match self.source {
                    Some(configure) => configure(base),
                    None => base,
                };
                let query = self
                    .steps
                    .into_iter()
                    .fold(configured, |query, step| step(query));
                store.materialize(query).await?
            }
        };

        for condition in &self.conditions {
            condition(&entities)?;
        }
        Ok(())
    }
}

impl<E: Entity> Default for AssertionQuery<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn single<E>(entities: &[E]) -> Result<&E> {
    match entities {
        [entity] => Ok(entity),
        _ => Err(FixtureError::assertion(
            "expected a single result",
            1,
            entities.len(),
        )),
    }
}

fn to_values<E: Serialize>(entities: &[E]) -> Result<Vec<Value>> {
    entities.iter().map(equivalence::to_value).collect()
}
