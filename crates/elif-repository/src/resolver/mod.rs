//! Relationship Resolver - Materializes and persists relationships against a store
//!
//! The resolver borrows an open store handle and never opens transactions of
//! its own. Cancellation is checked before every store call; in-memory work
//! between calls (grouping, diffing) runs to completion once started.

use tokio_util::sync::CancellationToken;

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::store::QueryableStore;

pub mod fetch;
pub mod mutate;

/// Resolves include and modify specifications against a store
#[derive(Clone, Copy)]
pub struct RelationshipResolver<'a> {
    store: &'a dyn QueryableStore,
    config: &'a RepositoryConfig,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(store: &'a dyn QueryableStore, config: &'a RepositoryConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &'a dyn QueryableStore {
        self.store
    }

    pub fn config(&self) -> &'a RepositoryConfig {
        self.config
    }
}

impl std::fmt::Debug for RelationshipResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipResolver")
            .field("config", self.config)
            .finish()
    }
}

/// Fail with `Cancelled` once the token has been triggered
pub fn ensure_active(cancel: &CancellationToken) -> RepositoryResult<()> {
    if cancel.is_cancelled() {
        return Err(RepositoryError::Cancelled);
    }
    Ok(())
}
