use std::cmp::Ordering;
use std::sync::Arc;

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type Comparator<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

enum QueryStep<E> {
    Filter(Predicate<E>),
    OrderBy(Comparator<E>),
    Skip(usize),
    Take(usize),
}

impl<E> Clone for QueryStep<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Filter(p) => Self::Filter(Arc::clone(p)),
            Self::OrderBy(c) => Self::OrderBy(Arc::clone(c)),
            Self::Skip(n) => Self::Skip(*n),
            Self::Take(n) => Self::Take(*n),
        }
    }
}

/// Deferred query over one entity collection.
///
/// Nothing runs until a store materializes the query; steps are then applied
/// in the order they were added, starting from the collection in insertion
/// order.
///
/// # Examples
///
/// ```
/// use rustmemodb_fixture::store::Query;
///
/// let query = Query::<i32>::all()
///     .filter(|n| n % 2 == 0)
///     .order_by(|a, b| b.cmp(a))
///     .take(2);
///
/// assert_eq!(query.apply(vec![1, 2, 3, 4, 6]), vec![6, 4]);
/// ```
pub struct Query<E> {
    steps: Vec<QueryStep<E>>,
}

impl<E> Query<E> {
    /// The whole collection
    pub fn all() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.steps.push(QueryStep::Filter(Arc::new(predicate)));
        self
    }

    /// Stable sort by comparator
    pub fn order_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&E, &E) -> Ordering + Send + Sync + 'static,
    {
        self.steps.push(QueryStep::OrderBy(Arc::new(compare)));
        self
    }

    /// Stable sort by an extracted key
    pub fn order_by_key<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        self.order_by(move |a, b| key(a).cmp(&key(b)))
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.steps.push(QueryStep::Skip(count));
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.steps.push(QueryStep::Take(count));
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Evaluate the query over `rows`
    pub fn apply(&self, mut rows: Vec<E>) -> Vec<E> {
        for step in &self.steps {
            match step {
                QueryStep::Filter(predicate) => rows.retain(|row| predicate(row)),
                QueryStep::OrderBy(compare) => rows.sort_by(|a, b| compare(a, b)),
                QueryStep::Skip(count) => {
                    let count = (*count).min(rows.len());
                    rows.drain(..count);
                }
                QueryStep::Take(count) => rows.truncate(*count),
            }
        }
        rows
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("steps", &self.steps.len())
            .finish()
    }
}
