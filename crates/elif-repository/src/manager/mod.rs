//! Entity Manager - Lifecycle hooks around repository writes
//!
//! Hook sets are composed explicitly when the manager is built. Each stage
//! runs across every registered set in registration order, and a failing
//! hook aborts the operation before the store is touched.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{RepositoryError, RepositoryResult, SpecificationError};
use crate::repository::Repository;
use crate::specification::{FindSpecification, ModifySpecification};

pub mod hooks;

pub use hooks::{HookSet, HookStage};

/// Builder for `EntityManager`
pub struct EntityManagerBuilder<E: Entity> {
    repository: Repository<E>,
    modify: ModifySpecification<E>,
    hook_sets: Vec<(String, HookSet<E>)>,
}

impl<E: Entity> EntityManagerBuilder<E> {
    pub fn new(repository: Repository<E>) -> Self {
        Self {
            repository,
            modify: ModifySpecification::new(),
            hook_sets: Vec::new(),
        }
    }

    /// Register a named hook set; names must be unique
    pub fn with_hooks(mut self, name: impl Into<String>, hooks: HookSet<E>) -> Self {
        self.hook_sets.push((name.into(), hooks));
        self
    }

    /// Relationships persisted by every create and update
    pub fn with_modify(mut self, modify: ModifySpecification<E>) -> Self {
        self.modify = modify;
        self
    }

    pub fn build(self) -> RepositoryResult<EntityManager<E>> {
        for (index, (name, _)) in self.hook_sets.iter().enumerate() {
            if self.hook_sets[..index].iter().any(|(earlier, _)| earlier == name) {
                return Err(SpecificationError::DuplicateHookSet(name.clone()).into());
            }
        }

        debug!(
            "Built {} manager with hook sets {:?}",
            E::entity_name(),
            self.hook_sets.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>()
        );
        Ok(EntityManager {
            repository: self.repository,
            modify: self.modify,
            hook_sets: self.hook_sets,
        })
    }
}

/// Runs lifecycle hooks, then delegates to the repository
pub struct EntityManager<E: Entity> {
    repository: Repository<E>,
    modify: ModifySpecification<E>,
    hook_sets: Vec<(String, HookSet<E>)>,
}

impl<E: Entity> EntityManager<E> {
    pub fn builder(repository: Repository<E>) -> EntityManagerBuilder<E> {
        EntityManagerBuilder::new(repository)
    }

    pub fn repository(&self) -> &Repository<E> {
        &self.repository
    }

    pub fn modify(&self) -> &ModifySpecification<E> {
        &self.modify
    }

    pub fn hook_set_names(&self) -> Vec<&str> {
        self.hook_sets.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn run_stage(&self, stage: HookStage, entity: &mut E) -> RepositoryResult<()> {
        for (name, hooks) in &self.hook_sets {
            hooks.run(stage, entity).map_err(|err| {
                debug!("{:?} hook in set '{}' rejected {}: {}", stage, name, E::entity_name(), err);
                err
            })?;
        }
        Ok(())
    }

    /// creating, saving, then `Repository::create`
    pub async fn create(&self, mut entity: E, cancel: &CancellationToken) -> RepositoryResult<E> {
        self.run_stage(HookStage::Creating, &mut entity)?;
        self.run_stage(HookStage::Saving, &mut entity)?;
        self.repository.create(entity, &self.modify, cancel).await
    }

    /// updating, saving, then `Repository::update`
    pub async fn update(&self, mut entity: E, cancel: &CancellationToken) -> RepositoryResult<E> {
        self.run_stage(HookStage::Updating, &mut entity)?;
        self.run_stage(HookStage::Saving, &mut entity)?;
        self.repository.update(entity, &self.modify, cancel).await
    }

    /// deleting hooks see the stored row before it is removed
    pub async fn delete(&self, key: &E::Key, cancel: &CancellationToken) -> RepositoryResult<E> {
        let existing = self
            .repository
            .find(&FindSpecification::by_key(key.clone()), cancel)
            .await?
            .ok_or_else(|| RepositoryError::not_found::<E>(key))?;

        for (_, hooks) in &self.hook_sets {
            hooks.run_deleting(&existing)?;
        }
        self.repository.delete(key, cancel).await
    }
}
