//! Lifecycle hook sets - capability modules selected when a manager is built

use std::fmt;
use std::sync::Arc;

use crate::entity::{Accessor, Entity};
use crate::error::RepositoryResult;

type MutHook<E> = Arc<dyn Fn(&mut E) -> RepositoryResult<()> + Send + Sync>;
type RefHook<E> = Arc<dyn Fn(&E) -> RepositoryResult<()> + Send + Sync>;

/// Lifecycle stage a hook runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    Creating,
    Updating,
    Saving,
    Deleting,
}

/// A named group of lifecycle hooks for one entity type
pub struct HookSet<E> {
    creating: Vec<MutHook<E>>,
    updating: Vec<MutHook<E>>,
    saving: Vec<MutHook<E>>,
    deleting: Vec<RefHook<E>>,
}

impl<E> Default for HookSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for HookSet<E> {
    fn clone(&self) -> Self {
        Self {
            creating: self.creating.clone(),
            updating: self.updating.clone(),
            saving: self.saving.clone(),
            deleting: self.deleting.clone(),
        }
    }
}

impl<E> fmt::Debug for HookSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("creating", &self.creating.len())
            .field("updating", &self.updating.len())
            .field("saving", &self.saving.len())
            .field("deleting", &self.deleting.len())
            .finish()
    }
}

impl<E> HookSet<E> {
    pub fn new() -> Self {
        Self {
            creating: Vec::new(),
            updating: Vec::new(),
            saving: Vec::new(),
            deleting: Vec::new(),
        }
    }

    pub fn on_creating<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut E) -> RepositoryResult<()> + Send + Sync + 'static,
    {
        self.creating.push(Arc::new(hook));
        self
    }

    pub fn on_updating<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut E) -> RepositoryResult<()> + Send + Sync + 'static,
    {
        self.updating.push(Arc::new(hook));
        self
    }

    /// Runs on both create and update, after the stage specific hooks
    pub fn on_saving<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut E) -> RepositoryResult<()> + Send + Sync + 'static,
    {
        self.saving.push(Arc::new(hook));
        self
    }

    pub fn on_deleting<F>(mut self, hook: F) -> Self
    where
        F: Fn(&E) -> RepositoryResult<()> + Send + Sync + 'static,
    {
        self.deleting.push(Arc::new(hook));
        self
    }

    pub fn len(&self, stage: HookStage) -> usize {
        match stage {
            HookStage::Creating => self.creating.len(),
            HookStage::Updating => self.updating.len(),
            HookStage::Saving => self.saving.len(),
            HookStage::Deleting => self.deleting.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.creating.is_empty()
            && self.updating.is_empty()
            && self.saving.is_empty()
            && self.deleting.is_empty()
    }

    /// Run the mutating hooks of `stage`; stops at the first error
    pub fn run(&self, stage: HookStage, entity: &mut E) -> RepositoryResult<()> {
        let hooks = match stage {
            HookStage::Creating => &self.creating,
            HookStage::Updating => &self.updating,
            HookStage::Saving => &self.saving,
            HookStage::Deleting => return self.run_deleting(entity),
        };
        for hook in hooks {
            hook(entity)?;
        }
        Ok(())
    }

    pub fn run_deleting(&self, entity: &E) -> RepositoryResult<()> {
        for hook in &self.deleting {
            hook(entity)?;
        }
        Ok(())
    }
}

impl<E: Entity> HookSet<E> {
    /// Trim a code field and upper-case it before every save
    pub fn code_normalization(code: Accessor<E, String>) -> Self {
        HookSet::new().on_saving(move |entity: &mut E| {
            let normalized = code.get(entity).trim().to_uppercase();
            code.set(entity, normalized);
            Ok(())
        })
    }

    /// Trim a name field and collapse runs of whitespace before every save
    pub fn name_normalization(name: Accessor<E, String>) -> Self {
        HookSet::new().on_saving(move |entity: &mut E| {
            let normalized = name.get(entity).split_whitespace().collect::<Vec<_>>().join(" ");
            name.set(entity, normalized);
            Ok(())
        })
    }
}
