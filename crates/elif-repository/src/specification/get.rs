//! Get specification - which relationships to load alongside a query

use std::fmt;
use std::sync::Arc;

use super::include::NavigationInclude;
use super::many_to_many::ManyToManyInclude;
use crate::entity::Entity;
use crate::error::SpecificationError;

/// Describes which related rows to eagerly load for a query
///
/// Includes are kept in insertion order and are not de-duplicated; they are
/// resolved in that order, navigation includes first, then string paths,
/// then many-to-many includes.
pub struct GetSpecification<E: Entity> {
    includes: Vec<Arc<dyn NavigationInclude<E>>>,
    include_paths: Vec<String>,
    many_to_many: Vec<Arc<dyn ManyToManyInclude<E>>>,
}

impl<E: Entity> Default for GetSpecification<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for GetSpecification<E> {
    fn clone(&self) -> Self {
        Self {
            includes: self.includes.clone(),
            include_paths: self.include_paths.clone(),
            many_to_many: self.many_to_many.clone(),
        }
    }
}

impl<E: Entity> fmt::Debug for GetSpecification<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetSpecification")
            .field("entity", &E::entity_name())
            .field("includes", &self.includes)
            .field("include_paths", &self.include_paths)
            .field("many_to_many", &self.many_to_many)
            .finish()
    }
}

impl<E: Entity> GetSpecification<E> {
    pub fn new() -> Self {
        Self {
            includes: Vec::new(),
            include_paths: Vec::new(),
            many_to_many: Vec::new(),
        }
    }

    /// Append a typed navigation include
    pub fn add_include<I>(&mut self, include: I) -> &mut Self
    where
        I: NavigationInclude<E> + 'static,
    {
        self.includes.push(Arc::new(include));
        self
    }

    /// Append a string path include, resolved by the store
    pub fn add_include_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.include_paths.push(path.into());
        self
    }

    /// Append a many-to-many include
    pub fn add_many_to_many<M>(&mut self, include: M) -> &mut Self
    where
        M: ManyToManyInclude<E> + 'static,
    {
        self.many_to_many.push(Arc::new(include));
        self
    }

    pub fn with_include<I>(mut self, include: I) -> Self
    where
        I: NavigationInclude<E> + 'static,
    {
        self.add_include(include);
        self
    }

    pub fn with_include_path(mut self, path: impl Into<String>) -> Self {
        self.add_include_path(path);
        self
    }

    pub fn with_many_to_many<M>(mut self, include: M) -> Self
    where
        M: ManyToManyInclude<E> + 'static,
    {
        self.add_many_to_many(include);
        self
    }

    pub fn includes(&self) -> &[Arc<dyn NavigationInclude<E>>] {
        &self.includes
    }

    pub fn include_paths(&self) -> &[String] {
        &self.include_paths
    }

    pub fn many_to_many(&self) -> &[Arc<dyn ManyToManyInclude<E>>] {
        &self.many_to_many
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.include_paths.is_empty() && self.many_to_many.is_empty()
    }

    /// Deepest chain of nested includes; string paths count as one level
    pub fn depth(&self) -> usize {
        let navigation = self.includes.iter().map(|include| include.depth());
        let paths = self.include_paths.iter().map(|_| 1);
        let many_to_many = self.many_to_many.iter().map(|include| include.depth());
        navigation.chain(paths).chain(many_to_many).max().unwrap_or(0)
    }

    /// Reject include graphs nested deeper than `max_depth`
    pub fn validate(&self, max_depth: usize) -> Result<(), SpecificationError> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(SpecificationError::IncludeDepthExceeded {
                depth,
                max: max_depth,
            });
        }
        Ok(())
    }
}
