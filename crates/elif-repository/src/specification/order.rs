//! Sort keys for search specifications

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Comparator<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// A single sort key: selector plus direction
pub struct OrderSpecification<E> {
    comparator: Comparator<E>,
    descending: bool,
}

impl<E: 'static> OrderSpecification<E> {
    pub fn new<K, F>(selector: F, descending: bool) -> Self
    where
        K: Ord + 'static,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self {
            comparator: Arc::new(move |a: &E, b: &E| selector(a).cmp(&selector(b))),
            descending,
        }
    }

    pub fn ascending<K, F>(selector: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self::new(selector, false)
    }

    pub fn descending<K, F>(selector: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self::new(selector, true)
    }
}

impl<E> OrderSpecification<E> {
    pub fn is_descending(&self) -> bool {
        self.descending
    }

    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        let ordering = (self.comparator)(a, b);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl<E> Clone for OrderSpecification<E> {
    fn clone(&self) -> Self {
        Self {
            comparator: Arc::clone(&self.comparator),
            descending: self.descending,
        }
    }
}

impl<E> fmt::Debug for OrderSpecification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSpecification")
            .field("descending", &self.descending)
            .finish()
    }
}

/// Lexicographic comparison over a list of sort keys
pub fn compare_all<E>(orders: &[OrderSpecification<E>], a: &E, b: &E) -> Ordering {
    orders
        .iter()
        .fold(Ordering::Equal, |acc, order| acc.then_with(|| order.compare(a, b)))
}
