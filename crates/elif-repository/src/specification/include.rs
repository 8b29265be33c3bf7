//! Navigation includes - eager loading of single references and collections

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::get::GetSpecification;
use crate::entity::{Entity, Getter};
use crate::error::RepositoryResult;
use crate::resolver::RelationshipResolver;
use crate::store::Query;

/// A relationship that can be materialized onto a set of loaded entities
#[async_trait]
pub trait NavigationInclude<E: Entity>: Send + Sync + fmt::Debug {
    /// Path name, also used to look the include up as a string path
    fn path(&self) -> &str;

    /// Nesting depth including child includes
    fn depth(&self) -> usize {
        1
    }

    /// Load the related rows and assign them onto `entities`
    async fn load(
        &self,
        resolver: &RelationshipResolver<'_>,
        entities: &mut [E],
        cancel: &CancellationToken,
    ) -> RepositoryResult<()>;
}

type Assign<E, V> = Arc<dyn Fn(&mut E, V) + Send + Sync>;

/// Many-to-one include: `E` holds the key of a single `R`
pub struct Reference<E, R: Entity> {
    path: String,
    foreign_key: Getter<E, Option<R::Key>>,
    assign: Assign<E, Option<R>>,
    children: GetSpecification<R>,
}

impl<E: Entity, R: Entity> Reference<E, R> {
    pub fn new<K, A>(path: impl Into<String>, foreign_key: K, assign: A) -> Self
    where
        K: Fn(&E) -> Option<R::Key> + Send + Sync + 'static,
        A: Fn(&mut E, Option<R>) + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            foreign_key: Getter::new(foreign_key),
            assign: Arc::new(assign),
            children: GetSpecification::new(),
        }
    }

    /// Includes applied to the loaded references
    pub fn with_children(mut self, children: GetSpecification<R>) -> Self {
        self.children = children;
        self
    }
}

impl<E, R: Entity> Clone for Reference<E, R> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            foreign_key: self.foreign_key.clone(),
            assign: Arc::clone(&self.assign),
            children: self.children.clone(),
        }
    }
}

impl<E, R: Entity> fmt::Debug for Reference<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("path", &self.path)
            .field("related", &R::entity_name())
            .field("children", &self.children)
            .finish()
    }
}

#[async_trait]
impl<E: Entity, R: Entity> NavigationInclude<E> for Reference<E, R> {
    fn path(&self) -> &str {
        &self.path
    }

    fn depth(&self) -> usize {
        1 + self.children.depth()
    }

    async fn load(
        &self,
        resolver: &RelationshipResolver<'_>,
        entities: &mut [E],
        cancel: &CancellationToken,
    ) -> RepositoryResult<()> {
        let keys: HashSet<R::Key> = entities
            .iter()
            .filter_map(|entity| self.foreign_key.get(entity))
            .collect();

        let mut related = if keys.is_empty() {
            Vec::new()
        } else {
            let query = Query::<R>::new().filter(move |row| keys.contains(&row.key()));
            resolver.fetch(&query, cancel).await?
        };
        resolver.load_includes(related.as_mut_slice(), &self.children, cancel).await?;

        let by_key: HashMap<R::Key, R> = related.into_iter().map(|row| (row.key(), row)).collect();
        for entity in entities.iter_mut() {
            let value = self
                .foreign_key
                .get(entity)
                .and_then(|key| by_key.get(&key).cloned());
            (self.assign)(entity, value);
        }
        Ok(())
    }
}

/// One-to-many include: each `R` holds a foreign key to its owning `E`
pub struct Collection<E, R: Entity, K> {
    path: String,
    key: Getter<E, K>,
    foreign_key: Getter<R, K>,
    assign: Assign<E, Vec<R>>,
    children: GetSpecification<R>,
}

impl<E, R, K> Collection<E, R, K>
where
    E: Entity,
    R: Entity,
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new<L, F, A>(path: impl Into<String>, key: L, foreign_key: F, assign: A) -> Self
    where
        L: Fn(&E) -> K + Send + Sync + 'static,
        F: Fn(&R) -> K + Send + Sync + 'static,
        A: Fn(&mut E, Vec<R>) + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            key: Getter::new(key),
            foreign_key: Getter::new(foreign_key),
            assign: Arc::new(assign),
            children: GetSpecification::new(),
        }
    }

    pub fn with_children(mut self, children: GetSpecification<R>) -> Self {
        self.children = children;
        self
    }
}

impl<E, R: Entity, K> Clone for Collection<E, R, K> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            key: self.key.clone(),
            foreign_key: self.foreign_key.clone(),
            assign: Arc::clone(&self.assign),
            children: self.children.clone(),
        }
    }
}

impl<E, R: Entity, K> fmt::Debug for Collection<E, R, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.path)
            .field("related", &R::entity_name())
            .field("children", &self.children)
            .finish()
    }
}

#[async_trait]
impl<E, R, K> NavigationInclude<E> for Collection<E, R, K>
where
    E: Entity,
    R: Entity,
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn path(&self) -> &str {
        &self.path
    }

    fn depth(&self) -> usize {
        1 + self.children.depth()
    }

    async fn load(
        &self,
        resolver: &RelationshipResolver<'_>,
        entities: &mut [E],
        cancel: &CancellationToken,
    ) -> RepositoryResult<()> {
        let keys: HashSet<K> = entities.iter().map(|entity| self.key.get(entity)).collect();
        if keys.is_empty() {
            return Ok(());
        }

        let foreign_key = self.foreign_key.clone();
        let query = Query::<R>::new().filter(move |row| keys.contains(&foreign_key.get(row)));
        let mut related = resolver.fetch(&query, cancel).await?;
        resolver.load_includes(related.as_mut_slice(), &self.children, cancel).await?;

        let mut grouped: HashMap<K, Vec<R>> = HashMap::new();
        for row in related {
            grouped
                .entry(self.foreign_key.get(&row))
                .or_default()
                .push(row);
        }
        for entity in entities.iter_mut() {
            let rows = grouped.get(&self.key.get(entity)).cloned().unwrap_or_default();
            (self.assign)(entity, rows);
        }
        Ok(())
    }
}
