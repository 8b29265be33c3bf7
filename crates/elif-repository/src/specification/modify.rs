//! Modify specifications - how relationships are persisted on create and update

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::ops::AddAssign;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::entity::{Accessor, Entity, Getter};
use crate::error::{RepositoryResult, SpecificationError};
use crate::resolver::RelationshipResolver;
use crate::store::{Query, UnitOfWork};

/// Link rows written and deleted by a relationship pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipChanges {
    pub added: usize,
    pub removed: usize,
}

impl AddAssign for RelationshipChanges {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
    }
}

/// Rewrites a foreign key from its parent navigation before persisting
pub trait OneToManyRelationship<E: Entity>: Send + Sync + fmt::Debug {
    /// Returns true when the foreign key was taken from the navigation
    fn prepare(&self, entity: &mut E) -> bool;
}

/// Synchronises the link rows of a many-to-many navigation collection
#[async_trait]
pub trait ManyToManyRelationship<E: Entity>: Send + Sync + fmt::Debug {
    /// Insert one link per distinct related id of a newly created entity
    async fn add(
        &self,
        resolver: &RelationshipResolver<'_>,
        entity: &E,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<RelationshipChanges>;

    /// Diff the navigation ids against the persisted links and apply the difference
    async fn update(
        &self,
        resolver: &RelationshipResolver<'_>,
        entity: &E,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<RelationshipChanges>;
}

/// One-to-many relationship persisted through a foreign key on `E`
///
/// The foreign key wins over the navigation: the parent's id is copied only
/// when the foreign key is unset (`None` or the default value), and the
/// navigation is then cleared so the parent is not written a second time.
pub struct OneToManyRelationshipSpecification<E, Id> {
    foreign_key: Accessor<E, Option<Id>>,
    parent_id: Getter<E, Option<Id>>,
    clear_parent: Arc<dyn Fn(&mut E) + Send + Sync>,
}

impl<E, Id> OneToManyRelationshipSpecification<E, Id> {
    pub fn new<P, C>(foreign_key: Accessor<E, Option<Id>>, parent_id: P, clear_parent: C) -> Self
    where
        P: Fn(&E) -> Option<Id> + Send + Sync + 'static,
        C: Fn(&mut E) + Send + Sync + 'static,
    {
        Self {
            foreign_key,
            parent_id: Getter::new(parent_id),
            clear_parent: Arc::new(clear_parent),
        }
    }
}

impl<E, Id> Clone for OneToManyRelationshipSpecification<E, Id> {
    fn clone(&self) -> Self {
        Self {
            foreign_key: self.foreign_key.clone(),
            parent_id: self.parent_id.clone(),
            clear_parent: Arc::clone(&self.clear_parent),
        }
    }
}

impl<E, Id> fmt::Debug for OneToManyRelationshipSpecification<E, Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneToManyRelationshipSpecification")
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

impl<E, Id> OneToManyRelationship<E> for OneToManyRelationshipSpecification<E, Id>
where
    E: Entity,
    Id: Default + PartialEq + Send + Sync + 'static,
{
    fn prepare(&self, entity: &mut E) -> bool {
        let unset = match self.foreign_key.get(entity) {
            None => true,
            Some(value) => value == Id::default(),
        };
        if !unset {
            return false;
        }

        match self.parent_id.get(entity) {
            Some(parent_id) => {
                self.foreign_key.set(entity, Some(parent_id));
                (self.clear_parent)(entity);
                true
            }
            None => false,
        }
    }
}

type LinkFactory<Link, ThisId, OtherId> = Arc<dyn Fn(ThisId, OtherId) -> Link + Send + Sync>;

/// Many-to-many relationship persisted through link rows
pub struct ManyToManyRelationshipSpecification<E, Link, ThisId, OtherId> {
    this_id: Getter<E, ThisId>,
    other_ids: Getter<E, Vec<OtherId>>,
    link_this_id: Getter<Link, ThisId>,
    link_other_id: Getter<Link, OtherId>,
    create_link: LinkFactory<Link, ThisId, OtherId>,
}

impl<E, Link, ThisId, OtherId> ManyToManyRelationshipSpecification<E, Link, ThisId, OtherId> {
    pub fn builder() -> ManyToManyRelationshipBuilder<E, Link, ThisId, OtherId> {
        ManyToManyRelationshipBuilder::new()
    }
}

impl<E, Link, ThisId, OtherId> Clone for ManyToManyRelationshipSpecification<E, Link, ThisId, OtherId> {
    fn clone(&self) -> Self {
        Self {
            this_id: self.this_id.clone(),
            other_ids: self.other_ids.clone(),
            link_this_id: self.link_this_id.clone(),
            link_other_id: self.link_other_id.clone(),
            create_link: Arc::clone(&self.create_link),
        }
    }
}

impl<E, Link, ThisId, OtherId> fmt::Debug for ManyToManyRelationshipSpecification<E, Link, ThisId, OtherId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyToManyRelationshipSpecification")
            .field("link", &std::any::type_name::<Link>())
            .finish()
    }
}

/// Ids in first-seen order without repeats
fn distinct<T: Clone + Eq + Hash>(ids: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[async_trait]
impl<E, Link, ThisId, OtherId> ManyToManyRelationship<E>
    for ManyToManyRelationshipSpecification<E, Link, ThisId, OtherId>
where
    E: Entity,
    Link: Entity,
    ThisId: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    OtherId: Clone + Eq + Hash + Send + Sync + 'static,
{
    async fn add(
        &self,
        resolver: &RelationshipResolver<'_>,
        entity: &E,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<RelationshipChanges> {
        let this_id = self.this_id.get(entity);
        let others = distinct(self.other_ids.get(entity));
        if others.is_empty() {
            return Ok(RelationshipChanges::default());
        }

        for other_id in &others {
            work.stage_add((self.create_link)(this_id.clone(), other_id.clone()));
        }
        resolver.flush_step(work, cancel).await?;

        debug!(
            "Linked {} {:?} to {} {} rows",
            E::entity_name(),
            this_id,
            others.len(),
            Link::entity_name()
        );
        Ok(RelationshipChanges {
            added: others.len(),
            removed: 0,
        })
    }

    async fn update(
        &self,
        resolver: &RelationshipResolver<'_>,
        entity: &E,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<RelationshipChanges> {
        let this_id = self.this_id.get(entity);
        let desired = distinct(self.other_ids.get(entity));

        let link_this_id = self.link_this_id.clone();
        let owner = this_id.clone();
        let query = Query::<Link>::new().filter(move |link| link_this_id.get(link) == owner);
        let existing: Vec<OtherId> = resolver
            .fetch(&query, cancel)
            .await?
            .iter()
            .map(|link| self.link_other_id.get(link))
            .collect();

        let current: HashSet<OtherId> = existing.iter().cloned().collect();
        let wanted: HashSet<OtherId> = desired.iter().cloned().collect();
        let to_add: Vec<OtherId> = desired.into_iter().filter(|id| !current.contains(id)).collect();
        let to_remove: Vec<OtherId> = existing.into_iter().filter(|id| !wanted.contains(id)).collect();

        debug!(
            "Relationship diff for {} {:?}: {} to add, {} to remove",
            E::entity_name(),
            this_id,
            to_add.len(),
            to_remove.len()
        );

        if !to_add.is_empty() {
            for other_id in &to_add {
                work.stage_add((self.create_link)(this_id.clone(), other_id.clone()));
            }
            resolver.flush_step(work, cancel).await?;
        }
        if !to_remove.is_empty() {
            for other_id in &to_remove {
                let transient = (self.create_link)(this_id.clone(), other_id.clone());
                work.stage_remove::<Link>(transient.key());
            }
            resolver.flush_step(work, cancel).await?;
        }

        Ok(RelationshipChanges {
            added: to_add.len(),
            removed: to_remove.len(),
        })
    }
}

/// Builder for `ManyToManyRelationshipSpecification`
pub struct ManyToManyRelationshipBuilder<E, Link, ThisId, OtherId> {
    this_id: Option<Getter<E, ThisId>>,
    other_ids: Option<Getter<E, Vec<OtherId>>>,
    link_this_id: Option<Getter<Link, ThisId>>,
    link_other_id: Option<Getter<Link, OtherId>>,
    create_link: Option<LinkFactory<Link, ThisId, OtherId>>,
}

impl<E, Link, ThisId, OtherId> Default for ManyToManyRelationshipBuilder<E, Link, ThisId, OtherId> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, Link, ThisId, OtherId> ManyToManyRelationshipBuilder<E, Link, ThisId, OtherId> {
    pub fn new() -> Self {
        Self {
            this_id: None,
            other_ids: None,
            link_this_id: None,
            link_other_id: None,
            create_link: None,
        }
    }

    pub fn this_id<F>(mut self, selector: F) -> Self
    where
        F: Fn(&E) -> ThisId + Send + Sync + 'static,
    {
        self.this_id = Some(Getter::new(selector));
        self
    }

    /// Ids of the related rows currently held in the navigation collection
    pub fn other_ids<F>(mut self, selector: F) -> Self
    where
        F: Fn(&E) -> Vec<OtherId> + Send + Sync + 'static,
    {
        self.other_ids = Some(Getter::new(selector));
        self
    }

    pub fn link_to_this<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Link) -> ThisId + Send + Sync + 'static,
    {
        self.link_this_id = Some(Getter::new(selector));
        self
    }

    pub fn link_to_other<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Link) -> OtherId + Send + Sync + 'static,
    {
        self.link_other_id = Some(Getter::new(selector));
        self
    }

    /// Constructs a link row from both foreign keys
    pub fn link_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(ThisId, OtherId) -> Link + Send + Sync + 'static,
    {
        self.create_link = Some(Arc::new(factory));
        self
    }

    pub fn build(
        self,
    ) -> Result<ManyToManyRelationshipSpecification<E, Link, ThisId, OtherId>, SpecificationError> {
        Ok(ManyToManyRelationshipSpecification {
            this_id: self.this_id.ok_or(SpecificationError::MissingSelector("this_id"))?,
            other_ids: self.other_ids.ok_or(SpecificationError::MissingSelector("other_ids"))?,
            link_this_id: self
                .link_this_id
                .ok_or(SpecificationError::MissingSelector("link_to_this"))?,
            link_other_id: self
                .link_other_id
                .ok_or(SpecificationError::MissingSelector("link_to_other"))?,
            create_link: self
                .create_link
                .ok_or(SpecificationError::MissingSelector("link_factory"))?,
        })
    }
}

/// Relationships to persist when an entity is created or updated
///
/// Descriptors are not validated when added; a misconfigured relationship
/// fails when it is first applied.
pub struct ModifySpecification<E: Entity> {
    one_to_many: Vec<Arc<dyn OneToManyRelationship<E>>>,
    many_to_many: Vec<Arc<dyn ManyToManyRelationship<E>>>,
}

impl<E: Entity> Default for ModifySpecification<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for ModifySpecification<E> {
    fn clone(&self) -> Self {
        Self {
            one_to_many: self.one_to_many.clone(),
            many_to_many: self.many_to_many.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for ModifySpecification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifySpecification")
            .field("one_to_many", &self.one_to_many)
            .field("many_to_many", &self.many_to_many)
            .finish()
    }
}

impl<E: Entity> ModifySpecification<E> {
    pub fn new() -> Self {
        Self {
            one_to_many: Vec::new(),
            many_to_many: Vec::new(),
        }
    }

    pub fn add_one_to_many<R>(&mut self, relationship: R) -> &mut Self
    where
        R: OneToManyRelationship<E> + 'static,
    {
        self.one_to_many.push(Arc::new(relationship));
        self
    }

    pub fn add_many_to_many<R>(&mut self, relationship: R) -> &mut Self
    where
        R: ManyToManyRelationship<E> + 'static,
    {
        self.many_to_many.push(Arc::new(relationship));
        self
    }

    pub fn with_one_to_many<R>(mut self, relationship: R) -> Self
    where
        R: OneToManyRelationship<E> + 'static,
    {
        self.add_one_to_many(relationship);
        self
    }

    pub fn with_many_to_many<R>(mut self, relationship: R) -> Self
    where
        R: ManyToManyRelationship<E> + 'static,
    {
        self.add_many_to_many(relationship);
        self
    }

    pub fn one_to_many(&self) -> &[Arc<dyn OneToManyRelationship<E>>] {
        &self.one_to_many
    }

    pub fn many_to_many(&self) -> &[Arc<dyn ManyToManyRelationship<E>>] {
        &self.many_to_many
    }

    pub fn is_empty(&self) -> bool {
        self.one_to_many.is_empty() && self.many_to_many.is_empty()
    }
}
