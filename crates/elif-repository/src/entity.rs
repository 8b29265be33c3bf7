//! Entity trait and typed property accessors
//!
//! Relationship specifications never reflect over entity fields. Instead the
//! owner of an entity supplies plain closures that read or write the fields a
//! relationship needs; `Getter` and `Accessor` wrap those closures so they can
//! be cloned into queries and shared between specifications.

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

/// Core trait for entities managed by a repository
pub trait Entity: Clone + Send + Sync + Debug + 'static {
    /// Identity of a stored row. Link entities use the pair of foreign keys.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Name used in logs and errors
    fn entity_name() -> &'static str;

    /// Key of this instance
    fn key(&self) -> Self::Key;
}

/// Read-only selector over an entity
pub struct Getter<E, V> {
    read: Arc<dyn Fn(&E) -> V + Send + Sync>,
}

impl<E, V> Getter<E, V> {
    pub fn new<F>(read: F) -> Self
    where
        F: Fn(&E) -> V + Send + Sync + 'static,
    {
        Self { read: Arc::new(read) }
    }

    pub fn get(&self, entity: &E) -> V {
        (self.read)(entity)
    }
}

impl<E, V> Clone for Getter<E, V> {
    fn clone(&self) -> Self {
        Self {
            read: Arc::clone(&self.read),
        }
    }
}

impl<E, V> Debug for Getter<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Getter<{}, {}>",
            std::any::type_name::<E>(),
            std::any::type_name::<V>()
        )
    }
}

/// Getter/setter pair over a single entity property
pub struct Accessor<E, V> {
    getter: Getter<E, V>,
    write: Arc<dyn Fn(&mut E, V) + Send + Sync>,
}

impl<E, V> Accessor<E, V> {
    pub fn new<G, S>(read: G, write: S) -> Self
    where
        G: Fn(&E) -> V + Send + Sync + 'static,
        S: Fn(&mut E, V) + Send + Sync + 'static,
    {
        Self {
            getter: Getter::new(read),
            write: Arc::new(write),
        }
    }

    pub fn get(&self, entity: &E) -> V {
        self.getter.get(entity)
    }

    pub fn set(&self, entity: &mut E, value: V) {
        (self.write)(entity, value)
    }

    /// Read-only view of this accessor
    pub fn getter(&self) -> &Getter<E, V> {
        &self.getter
    }
}

impl<E, V> Clone for Accessor<E, V> {
    fn clone(&self) -> Self {
        Self {
            getter: self.getter.clone(),
            write: Arc::clone(&self.write),
        }
    }
}

impl<E, V> Debug for Accessor<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Accessor<{}, {}>",
            std::any::type_name::<E>(),
            std::any::type_name::<V>()
        )
    }
}
