//! Fetch path - store reads and include materialization

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ensure_active, RelationshipResolver};
use crate::entity::Entity;
use crate::error::RepositoryResult;
use crate::specification::GetSpecification;
use crate::store::{Query, StoreExt};

impl<'a> RelationshipResolver<'a> {
    /// Materialize the rows of `E` matching a query
    pub async fn fetch<E: Entity>(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<E>> {
        ensure_active(cancel)?;
        let set = self.store.set::<E>()?;
        let rows = set.fetch(query).await?;
        debug!("Fetched {} {} rows", rows.len(), E::entity_name());
        Ok(rows)
    }

    /// Count the rows of `E` matching a query's criteria
    pub async fn count<E: Entity>(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<u64> {
        ensure_active(cancel)?;
        let set = self.store.set::<E>()?;
        let count = set.count(query).await?;
        debug!("Counted {} {} rows", count, E::entity_name());
        Ok(count)
    }

    /// Look up a single row of `E` by key
    pub async fn find<E: Entity>(
        &self,
        key: &E::Key,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Option<E>> {
        ensure_active(cancel)?;
        self.store.set::<E>()?.find(key).await
    }

    /// Apply every include of `spec` to already materialized entities
    ///
    /// Navigation includes run first, then string paths, then many-to-many
    /// includes, each in insertion order. Nested includes recurse through the
    /// include implementations.
    pub async fn load_includes<E: Entity>(
        &self,
        entities: &mut [E],
        spec: &GetSpecification<E>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<()> {
        if entities.is_empty() || spec.is_empty() {
            return Ok(());
        }

        for include in spec.includes() {
            include.load(self, entities, cancel).await?;
        }
        for path in spec.include_paths() {
            let include = self.store.include_path::<E>(path)?;
            include.load(self, entities, cancel).await?;
        }
        for include in spec.many_to_many() {
            include.load(self, entities, cancel).await?;
        }
        Ok(())
    }
}
