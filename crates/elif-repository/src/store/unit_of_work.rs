//! Unit of Work - Mutations staged by a single repository operation
//!
//! Every write operation begins its own `UnitOfWork`. Staging never touches
//! the store; `QueryableStore::save_changes` drains exactly the changes of
//! the unit it is given, so concurrent operations on one store cannot flush
//! or discard each other's work.

use std::any::{Any, TypeId};
use std::fmt;

use parking_lot::Mutex;

use crate::entity::Entity;

/// A mutation waiting for the next flush
#[derive(Debug, Clone, PartialEq)]
pub enum StagedChange<E: Entity> {
    Add(E),
    Update(E),
    Remove(E::Key),
}

/// Staged changes of one entity type, in staging order
pub struct PendingChanges {
    entity: TypeId,
    entity_name: &'static str,
    /// `Vec<StagedChange<E>>` behind `Any`
    changes: Box<dyn Any + Send>,
    len: usize,
}

impl PendingChanges {
    fn new<E: Entity>() -> Self {
        Self {
            entity: TypeId::of::<E>(),
            entity_name: E::entity_name(),
            changes: Box::new(Vec::<StagedChange<E>>::new()),
            len: 0,
        }
    }

    fn push<E: Entity>(&mut self, change: StagedChange<E>) {
        if let Some(changes) = self.changes.downcast_mut::<Vec<StagedChange<E>>>() {
            changes.push(change);
            self.len += 1;
        }
    }

    pub fn entity(&self) -> TypeId {
        self.entity
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Typed view; `None` when `E` is not the staged entity type
    pub fn changes<E: Entity>(&self) -> Option<&[StagedChange<E>]> {
        self.changes
            .downcast_ref::<Vec<StagedChange<E>>>()
            .map(Vec::as_slice)
    }

    pub fn into_changes<E: Entity>(self) -> Option<Vec<StagedChange<E>>> {
        self.changes
            .downcast::<Vec<StagedChange<E>>>()
            .ok()
            .map(|changes| *changes)
    }
}

impl fmt::Debug for PendingChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChanges")
            .field("entity", &self.entity_name)
            .field("len", &self.len)
            .finish()
    }
}

/// Changes staged by one operation, flushed or discarded as a whole
#[derive(Default)]
pub struct UnitOfWork {
    pending: Mutex<Vec<PendingChanges>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert
    pub fn stage_add<E: Entity>(&self, entity: E) {
        self.stage(StagedChange::Add(entity));
    }

    /// Stage a replacement of an existing row
    pub fn stage_update<E: Entity>(&self, entity: E) {
        self.stage(StagedChange::Update(entity));
    }

    /// Stage a delete by key
    pub fn stage_remove<E: Entity>(&self, key: E::Key) {
        self.stage(StagedChange::<E>::Remove(key));
    }

    fn stage<E: Entity>(&self, change: StagedChange<E>) {
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.iter_mut().find(|entry| entry.entity == TypeId::of::<E>()) {
            entry.push(change);
            return;
        }

        let mut entry = PendingChanges::new::<E>();
        entry.push(change);
        pending.push(entry);
    }

    /// Number of staged changes across all entity types
    pub fn len(&self) -> usize {
        self.pending.lock().iter().map(PendingChanges::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the staged changes, grouped by entity type in first-staged order
    pub fn take(&self) -> Vec<PendingChanges> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Drop everything staged; returns how many changes were dropped
    pub fn discard(&self) -> usize {
        self.take().iter().map(PendingChanges::len).sum()
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending", &*self.pending.lock())
            .finish()
    }
}
