//! Repository - Specification-driven reads and relationship-aware writes
//!
//! A `Repository<E>` borrows a caller-owned store handle. Reads translate a
//! specification into store queries and materialize includes; writes stage
//! the entity row plus its relationship changes and flush according to the
//! configured `FlushMode`. Each write owns a `UnitOfWork`, so concurrent
//! writes on a shared store never flush or discard each other's changes.
//! When a write fails, whatever its unit still holds is discarded before the
//! error is returned.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FlushMode, RepositoryConfig};
use crate::entity::Entity;
use crate::error::{RepositoryError, RepositoryResult};
use crate::resolver::RelationshipResolver;
use crate::specification::{
    FindSpecification, GetSpecification, ModifySpecification, PagedSearchSpecification,
    SearchSpecification,
};
use crate::store::{Criteria, Query, QueryableStore, UnitOfWork};

/// One page of a paged search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<E> {
    /// Rows matching the scope criteria
    pub total_count: u64,
    /// Rows matching scope and search criteria, before paging
    pub result_count: u64,
    pub results: Vec<E>,
}

impl<E> PagedResult<E> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct Repository<E: Entity> {
    store: Arc<dyn QueryableStore>,
    config: RepositoryConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::entity_name())
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn QueryableStore>) -> Self {
        Self::with_config(store, RepositoryConfig::default())
    }

    pub fn with_config(store: Arc<dyn QueryableStore>, config: RepositoryConfig) -> Self {
        Self {
            store,
            config,
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn QueryableStore> {
        &self.store
    }

    fn resolver(&self) -> RelationshipResolver<'_> {
        RelationshipResolver::new(self.store.as_ref(), &self.config)
    }

    /// Every row of `E` with the requested includes
    pub async fn get(
        &self,
        spec: &GetSpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>> {
        spec.validate(*self.config.get_max_include_depth())?;
        let resolver = self.resolver();

        let mut rows = resolver.fetch(&Query::<E>::new(), cancel).await?;
        resolver.load_includes(rows.as_mut_slice(), spec, cancel).await?;
        Ok(rows)
    }

    /// Filtered and ordered rows with the requested includes
    pub async fn search(
        &self,
        spec: &SearchSpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>> {
        spec.as_get().validate(*self.config.get_max_include_depth())?;
        let resolver = self.resolver();

        let mut query = Query::<E>::new().with_orders(spec.orders());
        if let Some(criteria) = spec.criteria() {
            query = query.with_criteria(Arc::clone(criteria));
        }

        let mut rows = resolver.fetch(&query, cancel).await?;
        resolver.load_includes(rows.as_mut_slice(), spec.as_get(), cancel).await?;
        Ok(rows)
    }

    /// Scope, count, filter, count, order, page, materialize, then include
    ///
    /// Includes are resolved on the returned page only.
    pub async fn paged_search(
        &self,
        spec: &PagedSearchSpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<PagedResult<E>> {
        spec.validate(&self.config)?;
        let resolver = self.resolver();

        let mut query = Query::<E>::new();
        if let Some(scope) = spec.scope_criteria() {
            query = query.with_criteria(Arc::clone(scope));
        }
        let total_count = resolver.count(&query, cancel).await?;

        if let Some(criteria) = spec.criteria() {
            query = query.with_criteria(Arc::clone(criteria));
        }
        let result_count = resolver.count(&query, cancel).await?;

        query = query.with_orders(spec.orders());
        if let Some((skip, take)) = spec.page_window() {
            query = query.skip(skip).take(take);
        }

        let mut results = resolver.fetch(&query, cancel).await?;
        resolver
            .load_includes(results.as_mut_slice(), spec.as_get(), cancel)
            .await?;

        debug!(
            "Paged search on {}: total {}, matched {}, page {}",
            E::entity_name(),
            total_count,
            result_count,
            results.len()
        );
        Ok(PagedResult {
            total_count,
            result_count,
            results,
        })
    }

    /// Single row matching the find specification, if any
    pub async fn find(
        &self,
        spec: &FindSpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        spec.as_get().validate(*self.config.get_max_include_depth())?;
        let resolver = self.resolver();

        let mut rows = resolver.fetch(&spec.to_query(), cancel).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        resolver.load_includes(rows.as_mut_slice(), spec.as_get(), cancel).await?;
        Ok(rows.into_iter().next())
    }

    /// Like `find`, but a missing row is a `NotFound` error
    pub async fn find_required(
        &self,
        spec: &FindSpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<E> {
        self.find(spec, cancel)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: E::entity_name(),
                key: spec.description().to_string(),
            })
    }

    /// Number of rows matching `criteria`, or all rows
    pub async fn count(
        &self,
        criteria: Option<Criteria<E>>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<u64> {
        let query = match criteria {
            Some(criteria) => Query::<E>::new().with_criteria(criteria),
            None => Query::<E>::new(),
        };
        self.resolver().count(&query, cancel).await
    }

    /// Persist a new entity together with its relationships
    ///
    /// Returns the entity as written, with one-to-many foreign keys prepared.
    pub async fn create(
        &self,
        entity: E,
        modify: &ModifySpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<E> {
        let work = UnitOfWork::new();
        let result = self.create_staged(entity, modify, &work, cancel).await;
        self.discard_on_error(&work, result)
    }

    async fn create_staged(
        &self,
        mut entity: E,
        modify: &ModifySpecification<E>,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<E> {
        let resolver = self.resolver();
        resolver.prepare_one_to_many(&mut entity, modify);

        work.stage_add(entity.clone());
        resolver.flush_step(work, cancel).await?;

        let changes = resolver.add_many_to_many(&entity, modify, work, cancel).await?;
        let affected = resolver.commit(work, cancel).await?;

        info!(
            "Created {} {:?} with {} links ({} rows flushed)",
            E::entity_name(),
            entity.key(),
            changes.added,
            affected
        );
        Ok(entity)
    }

    /// Replace an existing entity and synchronise its relationships
    pub async fn update(
        &self,
        entity: E,
        modify: &ModifySpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<E> {
        let work = UnitOfWork::new();
        let result = self.update_staged(entity, modify, &work, cancel).await;
        self.discard_on_error(&work, result)
    }

    async fn update_staged(
        &self,
        mut entity: E,
        modify: &ModifySpecification<E>,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<E> {
        let resolver = self.resolver();
        let key = entity.key();
        if resolver.find::<E>(&key, cancel).await?.is_none() {
            return Err(RepositoryError::not_found::<E>(&key));
        }

        resolver.prepare_one_to_many(&mut entity, modify);
        work.stage_update(entity.clone());
        resolver.flush_step(work, cancel).await?;

        let changes = resolver.update_many_to_many(&entity, modify, work, cancel).await?;
        resolver.commit(work, cancel).await?;

        info!(
            "Updated {} {:?}: {} links added, {} removed",
            E::entity_name(),
            key,
            changes.added,
            changes.removed
        );
        Ok(entity)
    }

    /// Delete an existing entity, returning the removed row
    ///
    /// Link rows are not cascaded; remove them through an update first.
    pub async fn delete(&self, key: &E::Key, cancel: &CancellationToken) -> RepositoryResult<E> {
        let work = UnitOfWork::new();
        let result = self.delete_staged(key, &work, cancel).await;
        self.discard_on_error(&work, result)
    }

    async fn delete_staged(
        &self,
        key: &E::Key,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<E> {
        let resolver = self.resolver();
        let existing = resolver
            .find::<E>(key, cancel)
            .await?
            .ok_or_else(|| RepositoryError::not_found::<E>(key))?;

        work.stage_remove::<E>(key.clone());
        resolver.commit(work, cancel).await?;

        info!("Deleted {} {:?}", E::entity_name(), key);
        Ok(existing)
    }

    fn discard_on_error<T>(&self, work: &UnitOfWork, result: RepositoryResult<T>) -> RepositoryResult<T> {
        if let Err(err) = &result {
            let dropped = work.discard();
            if *self.config.get_flush_mode() == FlushMode::PerStep {
                warn!(
                    "{} write failed after per-step flushes, earlier steps stay persisted: {}",
                    E::entity_name(),
                    err
                );
            } else {
                debug!(
                    "{} write failed, discarded {} staged changes: {}",
                    E::entity_name(),
                    dropped,
                    err
                );
            }
        }
        result
    }
}
