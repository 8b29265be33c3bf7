//! Find specification - single entity lookup

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::get::GetSpecification;
use crate::entity::Entity;
use crate::store::{Criteria, Query};

/// Lookup of a single entity by a key selector plus an optional predicate
pub struct FindSpecification<E: Entity> {
    get: GetSpecification<E>,
    selector: Criteria<E>,
    predicate: Option<Criteria<E>>,
    description: String,
}

impl<E: Entity> Clone for FindSpecification<E> {
    fn clone(&self) -> Self {
        Self {
            get: self.get.clone(),
            selector: Arc::clone(&self.selector),
            predicate: self.predicate.clone(),
            description: self.description.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for FindSpecification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindSpecification")
            .field("lookup", &self.description)
            .field("has_predicate", &self.predicate.is_some())
            .field("get", &self.get)
            .finish()
    }
}

impl<E: Entity> Deref for FindSpecification<E> {
    type Target = GetSpecification<E>;

    fn deref(&self) -> &Self::Target {
        &self.get
    }
}

impl<E: Entity> DerefMut for FindSpecification<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.get
    }
}

impl<E: Entity> FindSpecification<E> {
    /// Find by the entity key
    pub fn by_key(key: E::Key) -> Self {
        let description = format!("{:?}", key);
        Self::from_selector(move |entity: &E| entity.key() == key, description)
    }

    /// Find by any selector equal to `value`, e.g. a unique code
    pub fn by<V, F>(selector: F, value: V) -> Self
    where
        V: PartialEq + fmt::Debug + Send + Sync + 'static,
        F: Fn(&E) -> V + Send + Sync + 'static,
    {
        let description = format!("{:?}", value);
        Self::from_selector(move |entity: &E| selector(entity) == value, description)
    }

    fn from_selector<F>(selector: F, description: String) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            get: GetSpecification::new(),
            selector: Arc::new(selector),
            predicate: None,
            description,
        }
    }

    /// Additional predicate the entity must satisfy
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_includes(mut self, get: GetSpecification<E>) -> Self {
        self.get = get;
        self
    }

    /// Debug rendering of the looked-up value, used in not-found errors
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn as_get(&self) -> &GetSpecification<E> {
        &self.get
    }

    /// Store query selecting the candidate row
    pub fn to_query(&self) -> Query<E> {
        let query = Query::new().with_criteria(Arc::clone(&self.selector)).take(1);
        match &self.predicate {
            Some(predicate) => query.with_criteria(Arc::clone(predicate)),
            None => query,
        }
    }
}
