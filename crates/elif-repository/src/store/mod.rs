//! Queryable Store - The data source abstraction consumed by the resolver
//!
//! A store hands out typed entity sets and flushes staged mutations. It is
//! owned by the caller: repositories borrow it and never close it.

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::{RepositoryError, RepositoryResult};
use crate::specification::include::NavigationInclude;

pub mod memory;
pub mod query;
pub mod unit_of_work;

pub use memory::MemoryStore;
pub use query::{Criteria, Query};
pub use unit_of_work::{PendingChanges, StagedChange, UnitOfWork};

/// Typed access to the rows of one entity type
#[async_trait]
pub trait EntitySet<E: Entity>: Send + Sync {
    /// Materialize the rows matching a query
    async fn fetch(&self, query: &Query<E>) -> RepositoryResult<Vec<E>>;

    /// Count the rows matching a query's criteria
    async fn count(&self, query: &Query<E>) -> RepositoryResult<u64>;

    /// Look up a single row by key
    async fn find(&self, key: &E::Key) -> RepositoryResult<Option<E>>;
}

/// Store capability: entity sets, named include paths and flushing units of work
///
/// Entity sets and include paths are looked up by `TypeId` so the trait stays
/// object safe; use `StoreExt` for the typed view.
#[async_trait]
pub trait QueryableStore: Send + Sync {
    /// Type-erased `Arc<dyn EntitySet<E>>` for the entity with the given type id
    fn entity_set(&self, entity: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Type-erased `Arc<dyn NavigationInclude<E>>` registered under a path
    fn named_include(&self, entity: TypeId, path: &str) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Write the changes staged in `work`, all or nothing
    ///
    /// The unit of work is drained either way: a rejected flush applies none
    /// of its changes and leaves other units untouched. Returns the number of
    /// affected rows.
    async fn save_changes(&self, work: &UnitOfWork) -> RepositoryResult<usize>;
}

/// Typed helpers over `QueryableStore`
pub trait StoreExt {
    fn set<E: Entity>(&self) -> RepositoryResult<Arc<dyn EntitySet<E>>>;

    fn include_path<E: Entity>(&self, path: &str) -> RepositoryResult<Arc<dyn NavigationInclude<E>>>;
}

impl<S: QueryableStore + ?Sized> StoreExt for S {
    fn set<E: Entity>(&self) -> RepositoryResult<Arc<dyn EntitySet<E>>> {
        self.entity_set(TypeId::of::<E>())
            .and_then(|erased| erased.downcast::<Arc<dyn EntitySet<E>>>().ok())
            .map(|set| Arc::clone(&*set))
            .ok_or(RepositoryError::UnknownEntitySet(E::entity_name()))
    }

    fn include_path<E: Entity>(&self, path: &str) -> RepositoryResult<Arc<dyn NavigationInclude<E>>> {
        self.named_include(TypeId::of::<E>(), path)
            .and_then(|erased| erased.downcast::<Arc<dyn NavigationInclude<E>>>().ok())
            .map(|include| Arc::clone(&*include))
            .ok_or_else(|| RepositoryError::UnknownIncludePath {
                entity: E::entity_name(),
                path: path.to_string(),
            })
    }
}
