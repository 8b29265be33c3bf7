//! Store query shape - criteria, ordering and paging sent to an entity set

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::specification::order::{compare_all, OrderSpecification};

/// Pure predicate over an entity
pub type Criteria<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Query against a single entity set
///
/// Criteria are combined with AND. Orders apply left to right as primary,
/// secondary, ... keys. `count` ignores ordering and paging.
pub struct Query<E> {
    pub(crate) criteria: Vec<Criteria<E>>,
    pub(crate) orders: Vec<OrderSpecification<E>>,
    pub(crate) skip: Option<u64>,
    pub(crate) take: Option<u64>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            orders: self.orders.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("criteria", &self.criteria.len())
            .field("orders", &self.orders)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}

impl<E> Query<E> {
    pub fn new() -> Self {
        Self {
            criteria: Vec::new(),
            orders: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// Add a predicate
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.criteria.push(Arc::new(predicate));
        self
    }

    /// Add an already shared predicate
    pub fn with_criteria(mut self, criteria: Criteria<E>) -> Self {
        self.criteria.push(criteria);
        self
    }

    /// Append a sort key
    pub fn order_by(mut self, order: OrderSpecification<E>) -> Self {
        self.orders.push(order);
        self
    }

    /// Append several sort keys, keeping their order
    pub fn with_orders(mut self, orders: &[OrderSpecification<E>]) -> Self {
        self.orders.extend(orders.iter().cloned());
        self
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.skip = Some(count);
        self
    }

    pub fn take(mut self, count: u64) -> Self {
        self.take = Some(count);
        self
    }

    pub fn orders(&self) -> &[OrderSpecification<E>] {
        &self.orders
    }

    pub fn skip_count(&self) -> Option<u64> {
        self.skip
    }

    pub fn take_count(&self) -> Option<u64> {
        self.take
    }

    /// Whether an entity satisfies every predicate
    pub fn matches(&self, entity: &E) -> bool {
        self.criteria.iter().all(|criteria| criteria(entity))
    }

    /// Compare two entities by the configured sort keys
    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        compare_all(&self.orders, a, b)
    }
}

impl<E: Entity> Query<E> {
    /// Evaluate the query over rows held in memory
    ///
    /// Sorting is stable, so rows that compare equal keep their input order.
    pub fn evaluate<'a, I>(&self, rows: I) -> Vec<E>
    where
        I: IntoIterator<Item = &'a E>,
    {
        let mut matched: Vec<E> = rows
            .into_iter()
            .filter(|row| self.matches(row))
            .cloned()
            .collect();

        if !self.orders.is_empty() {
            matched.sort_by(|a, b| self.compare(a, b));
        }

        let skip = self.skip.map(to_usize).unwrap_or(0);
        let take = self.take.map(to_usize).unwrap_or(usize::MAX);
        matched.into_iter().skip(skip).take(take).collect()
    }

    /// Count rows satisfying the criteria, ignoring ordering and paging
    pub fn count_matching<'a, I>(&self, rows: I) -> u64
    where
        I: IntoIterator<Item = &'a E>,
    {
        rows.into_iter().filter(|row| self.matches(row)).count() as u64
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
