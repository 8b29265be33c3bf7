//! In-memory store implementation for development and testing

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::query::Query;
use super::unit_of_work::{PendingChanges, StagedChange, UnitOfWork};
use super::{EntitySet, QueryableStore};
use crate::entity::Entity;
use crate::error::{RepositoryError, RepositoryResult};
use crate::specification::include::NavigationInclude;

/// Rows of one entity type in insertion order
struct Rows<E: Entity> {
    next_seq: u64,
    by_seq: BTreeMap<u64, E>,
    seq_by_key: HashMap<E::Key, u64>,
}

impl<E: Entity> Rows<E> {
    fn new() -> Self {
        Self {
            next_seq: 0,
            by_seq: BTreeMap::new(),
            seq_by_key: HashMap::new(),
        }
    }

    fn contains(&self, key: &E::Key) -> bool {
        self.seq_by_key.contains_key(key)
    }

    fn insert(&mut self, entity: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.seq_by_key.insert(entity.key(), seq);
        self.by_seq.insert(seq, entity);
    }

    fn replace(&mut self, entity: E) {
        if let Some(seq) = self.seq_by_key.get(&entity.key()) {
            self.by_seq.insert(*seq, entity);
        }
    }

    fn remove(&mut self, key: &E::Key) {
        if let Some(seq) = self.seq_by_key.remove(key) {
            self.by_seq.remove(&seq);
        }
    }
}

/// Flush participation of a registered set, independent of its entity type
///
/// Both methods run with the store gate held for writing.
trait MemoryTable: Send + Sync {
    fn validate(&self, pending: &PendingChanges) -> RepositoryResult<()>;
    fn apply(&self, pending: PendingChanges) -> usize;
}

/// Entity set backed by memory
struct MemorySet<E: Entity> {
    rows: RwLock<Rows<E>>,
    /// Shared with the store; reads hold it for reading, flushes for writing
    gate: Arc<RwLock<()>>,
}

impl<E: Entity> MemorySet<E> {
    fn new(gate: Arc<RwLock<()>>) -> Self {
        Self {
            rows: RwLock::new(Rows::new()),
            gate,
        }
    }

    fn seed(&self, entities: Vec<E>) -> RepositoryResult<()> {
        let mut rows = self.rows.write();
        for entity in entities {
            let key = entity.key();
            if rows.contains(&key) {
                return Err(RepositoryError::conflict::<E>(&key));
            }
            rows.insert(entity);
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<E> {
        self.rows.read().by_seq.values().cloned().collect()
    }
}

impl<E: Entity> MemoryTable for MemorySet<E> {
    fn validate(&self, pending: &PendingChanges) -> RepositoryResult<()> {
        let changes = pending
            .changes::<E>()
            .ok_or(RepositoryError::UnknownEntitySet(pending.entity_name()))?;
        let rows = self.rows.read();

        // Keys touched by earlier changes of the same flush
        let mut overlay: HashMap<E::Key, bool> = HashMap::new();
        for change in changes {
            match change {
                StagedChange::Add(entity) => {
                    let key = entity.key();
                    let exists = overlay.get(&key).copied().unwrap_or_else(|| rows.contains(&key));
                    if exists {
                        return Err(RepositoryError::conflict::<E>(&key));
                    }
                    overlay.insert(key, true);
                }
                StagedChange::Update(entity) => {
                    let key = entity.key();
                    let exists = overlay.get(&key).copied().unwrap_or_else(|| rows.contains(&key));
                    if !exists {
                        return Err(RepositoryError::not_found::<E>(&key));
                    }
                }
                StagedChange::Remove(key) => {
                    let exists = overlay.get(key).copied().unwrap_or_else(|| rows.contains(key));
                    if !exists {
                        return Err(RepositoryError::not_found::<E>(key));
                    }
                    overlay.insert(key.clone(), false);
                }
            }
        }
        Ok(())
    }

    fn apply(&self, pending: PendingChanges) -> usize {
        let changes = pending.into_changes::<E>().unwrap_or_default();
        let mut rows = self.rows.write();
        let affected = changes.len();
        for change in changes {
            match change {
                StagedChange::Add(entity) => rows.insert(entity),
                StagedChange::Update(entity) => rows.replace(entity),
                StagedChange::Remove(key) => rows.remove(&key),
            }
        }
        affected
    }
}

#[async_trait]
impl<E: Entity> EntitySet<E> for MemorySet<E> {
    async fn fetch(&self, query: &Query<E>) -> RepositoryResult<Vec<E>> {
        let _gate = self.gate.read();
        let rows = self.rows.read();
        Ok(query.evaluate(rows.by_seq.values()))
    }

    async fn count(&self, query: &Query<E>) -> RepositoryResult<u64> {
        let _gate = self.gate.read();
        let rows = self.rows.read();
        Ok(query.count_matching(rows.by_seq.values()))
    }

    async fn find(&self, key: &E::Key) -> RepositoryResult<Option<E>> {
        let _gate = self.gate.read();
        let rows = self.rows.read();
        Ok(rows
            .seq_by_key
            .get(key)
            .and_then(|seq| rows.by_seq.get(seq))
            .cloned())
    }
}

struct Registration {
    /// `Arc<dyn EntitySet<E>>` behind `Any`
    set: Arc<dyn Any + Send + Sync>,
    /// `MemorySet<E>` behind `Any`
    typed: Arc<dyn Any + Send + Sync>,
    table: Arc<dyn MemoryTable>,
}

/// In-memory queryable store
///
/// Entity types must be registered before use. A flush validates every
/// change of its unit of work against the committed rows and applies them
/// only if all are valid. Flushes are serialized and readers never observe
/// a half-applied unit.
pub struct MemoryStore {
    sets: DashMap<TypeId, Registration>,
    includes: DashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>,
    gate: Arc<RwLock<()>>,
    flushes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
            includes: DashMap::new(),
            gate: Arc::new(RwLock::new(())),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Register an entity set; registering twice keeps the existing rows
    pub fn register<E: Entity>(&self) -> &Self {
        self.sets.entry(TypeId::of::<E>()).or_insert_with(|| {
            let set = Arc::new(MemorySet::<E>::new(Arc::clone(&self.gate)));
            let erased: Arc<dyn EntitySet<E>> = set.clone();
            Registration {
                set: Arc::new(erased),
                typed: set.clone(),
                table: set,
            }
        });
        self
    }

    /// Consuming form of `register`
    pub fn with_entity<E: Entity>(self) -> Self {
        self.register::<E>();
        self
    }

    /// Register a navigation include that can be requested by its path string
    pub fn register_path<E, I>(&self, include: I) -> &Self
    where
        E: Entity,
        I: NavigationInclude<E> + 'static,
    {
        let key = (TypeId::of::<E>(), include.path().to_string());
        let include: Arc<dyn NavigationInclude<E>> = Arc::new(include);
        self.includes.insert(key, Arc::new(include));
        self
    }

    /// Insert rows directly, bypassing units of work
    pub fn seed<E, I>(&self, entities: I) -> RepositoryResult<()>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        self.typed_set::<E>()?.seed(entities.into_iter().collect())
    }

    /// Committed rows of an entity type in insertion order
    pub fn rows<E: Entity>(&self) -> RepositoryResult<Vec<E>> {
        Ok(self.typed_set::<E>()?.snapshot())
    }

    /// Number of `save_changes` calls so far
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn typed_set<E: Entity>(&self) -> RepositoryResult<Arc<MemorySet<E>>> {
        self.sets
            .get(&TypeId::of::<E>())
            .and_then(|registration| registration.typed.clone().downcast::<MemorySet<E>>().ok())
            .ok_or(RepositoryError::UnknownEntitySet(E::entity_name()))
    }

    fn table(&self, pending: &PendingChanges) -> RepositoryResult<Arc<dyn MemoryTable>> {
        self.sets
            .get(&pending.entity())
            .map(|registration| Arc::clone(&registration.table))
            .ok_or(RepositoryError::UnknownEntitySet(pending.entity_name()))
    }
}

#[async_trait]
impl QueryableStore for MemoryStore {
    fn entity_set(&self, entity: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.sets
            .get(&entity)
            .map(|registration| Arc::clone(&registration.set))
    }

    fn named_include(&self, entity: TypeId, path: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.includes
            .get(&(entity, path.to_string()))
            .map(|include| include.value().clone())
    }

    async fn save_changes(&self, work: &UnitOfWork) -> RepositoryResult<usize> {
        let pending = work.take();
        self.flushes.fetch_add(1, Ordering::SeqCst);

        let mut batches = Vec::with_capacity(pending.len());
        for changes in pending {
            let table = self.table(&changes)?;
            batches.push((table, changes));
        }

        let _gate = self.gate.write();
        if let Some(err) = batches
            .iter()
            .find_map(|(table, changes)| table.validate(changes).err())
        {
            let dropped: usize = batches.iter().map(|(_, changes)| changes.len()).sum();
            warn!("Memory store flush rejected, dropping {} staged changes: {}", dropped, err);
            return Err(err);
        }

        let affected: usize = batches
            .into_iter()
            .map(|(table, changes)| table.apply(changes))
            .sum();
        debug!("Memory store flushed {} staged changes", affected);
        Ok(affected)
    }
}
