//! Search and paged search specifications

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::get::GetSpecification;
use super::order::OrderSpecification;
use crate::config::RepositoryConfig;
use crate::entity::Entity;
use crate::error::SpecificationError;
use crate::store::Criteria;

/// Get specification plus a filter and an ordered list of sort keys
pub struct SearchSpecification<E: Entity> {
    get: GetSpecification<E>,
    criteria: Option<Criteria<E>>,
    orders: Vec<OrderSpecification<E>>,
}

impl<E: Entity> Default for SearchSpecification<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for SearchSpecification<E> {
    fn clone(&self) -> Self {
        Self {
            get: self.get.clone(),
            criteria: self.criteria.clone(),
            orders: self.orders.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for SearchSpecification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSpecification")
            .field("get", &self.get)
            .field("has_criteria", &self.criteria.is_some())
            .field("orders", &self.orders)
            .finish()
    }
}

impl<E: Entity> Deref for SearchSpecification<E> {
    type Target = GetSpecification<E>;

    fn deref(&self) -> &Self::Target {
        &self.get
    }
}

impl<E: Entity> DerefMut for SearchSpecification<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.get
    }
}

impl<E: Entity> SearchSpecification<E> {
    pub fn new() -> Self {
        Self::from_get(GetSpecification::new())
    }

    /// Start from an existing set of includes
    pub fn from_get(get: GetSpecification<E>) -> Self {
        Self {
            get,
            criteria: None,
            orders: Vec::new(),
        }
    }

    /// Set the filter predicate; it must not have side effects
    pub fn with_criteria<F>(mut self, criteria: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.set_criteria(criteria);
        self
    }

    pub fn set_criteria<F>(&mut self, criteria: F) -> &mut Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.criteria = Some(Arc::new(criteria));
        self
    }

    /// Append a sort key; earlier keys take precedence
    pub fn add_order<K, F>(&mut self, selector: F, descending: bool) -> &mut Self
    where
        K: Ord + 'static,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        self.orders.push(OrderSpecification::new(selector, descending));
        self
    }

    pub fn order_by<K, F>(mut self, selector: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        self.add_order(selector, false);
        self
    }

    pub fn order_by_desc<K, F>(mut self, selector: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        self.add_order(selector, true);
        self
    }

    pub fn criteria(&self) -> Option<&Criteria<E>> {
        self.criteria.as_ref()
    }

    pub fn orders(&self) -> &[OrderSpecification<E>] {
        &self.orders
    }

    pub fn as_get(&self) -> &GetSpecification<E> {
        &self.get
    }
}

/// Search specification with scope criteria and optional paging
///
/// Page numbers are 1-based. Without a page size no paging is applied; a page
/// size without a page number reads the first page.
pub struct PagedSearchSpecification<E: Entity> {
    search: SearchSpecification<E>,
    scope_criteria: Option<Criteria<E>>,
    page_size: Option<u64>,
    page_number: Option<u64>,
}

impl<E: Entity> Default for PagedSearchSpecification<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for PagedSearchSpecification<E> {
    fn clone(&self) -> Self {
        Self {
            search: self.search.clone(),
            scope_criteria: self.scope_criteria.clone(),
            page_size: self.page_size,
            page_number: self.page_number,
        }
    }
}

impl<E: Entity> fmt::Debug for PagedSearchSpecification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedSearchSpecification")
            .field("search", &self.search)
            .field("has_scope_criteria", &self.scope_criteria.is_some())
            .field("page_size", &self.page_size)
            .field("page_number", &self.page_number)
            .finish()
    }
}

impl<E: Entity> Deref for PagedSearchSpecification<E> {
    type Target = SearchSpecification<E>;

    fn deref(&self) -> &Self::Target {
        &self.search
    }
}

impl<E: Entity> DerefMut for PagedSearchSpecification<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.search
    }
}

impl<E: Entity> PagedSearchSpecification<E> {
    pub fn new() -> Self {
        Self::from_search(SearchSpecification::new())
    }

    pub fn from_search(search: SearchSpecification<E>) -> Self {
        Self {
            search,
            scope_criteria: None,
            page_size: None,
            page_number: None,
        }
    }

    /// Universe of the query, applied before `total_count` is computed
    pub fn with_scope<F>(mut self, scope: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.scope_criteria = Some(Arc::new(scope));
        self
    }

    pub fn paginate(mut self, page_size: u64, page_number: u64) -> Self {
        self.page_size = Some(page_size);
        self.page_number = Some(page_number);
        self
    }

    pub fn set_page_size(&mut self, page_size: Option<u64>) -> &mut Self {
        self.page_size = page_size;
        self
    }

    pub fn set_page_number(&mut self, page_number: Option<u64>) -> &mut Self {
        self.page_number = page_number;
        self
    }

    pub fn scope_criteria(&self) -> Option<&Criteria<E>> {
        self.scope_criteria.as_ref()
    }

    pub fn page_size(&self) -> Option<u64> {
        self.page_size
    }

    pub fn page_number(&self) -> Option<u64> {
        self.page_number
    }

    /// `(skip, take)` for the configured page, if paging applies
    pub fn page_window(&self) -> Option<(u64, u64)> {
        self.page_size.map(|size| {
            let page = self.page_number.unwrap_or(1).max(1);
            ((page - 1).saturating_mul(size), size)
        })
    }

    pub fn as_search(&self) -> &SearchSpecification<E> {
        &self.search
    }

    pub fn validate(&self, config: &RepositoryConfig) -> Result<(), SpecificationError> {
        self.search.as_get().validate(*config.get_max_include_depth())?;

        if self.page_number == Some(0) {
            return Err(SpecificationError::InvalidPageNumber(0));
        }
        let max_page_size = *config.get_max_page_size();
        if let Some(size) = self.page_size {
            if max_page_size > 0 && size > max_page_size {
                return Err(SpecificationError::PageSizeTooLarge {
                    requested: size,
                    max: max_page_size,
                });
            }
        }
        Ok(())
    }
}
