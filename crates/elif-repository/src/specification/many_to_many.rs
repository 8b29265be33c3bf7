//! Many-to-many include specifications
//!
//! A many-to-many include resolves a junction (link) table by hand: collect
//! the ids of the loaded "this" rows, read the matching link rows, collect the
//! "other" ids they point at, then load those "other" rows and assign them
//! back. Child includes are a typed `GetSpecification<Other>`, so nested
//! graphs such as article -> categories -> articles -> author are checked per
//! entity kind at compile time and bounded by `max_include_depth`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::get::GetSpecification;
use crate::entity::{Entity, Getter};
use crate::error::{RepositoryResult, SpecificationError};
use crate::resolver::RelationshipResolver;
use crate::store::Query;

/// Type-erased many-to-many include over `This`
#[async_trait]
pub trait ManyToManyInclude<This: Entity>: Send + Sync + fmt::Debug {
    /// Nesting depth including child includes
    fn depth(&self) -> usize;

    /// Load the related rows for every entity in `this` and assign them
    async fn load(
        &self,
        resolver: &RelationshipResolver<'_>,
        this: &mut [This],
        cancel: &CancellationToken,
    ) -> RepositoryResult<()>;
}

type AssignOthers<This, Other> = Arc<dyn Fn(&mut This, Vec<Other>) + Send + Sync>;

/// Junction-table relationship to resolve when fetching
pub struct ManyToManyIncludeSpecification<This, Other: Entity, Link, ThisId, OtherId> {
    this_id: Getter<This, ThisId>,
    other_id: Getter<Other, OtherId>,
    link_this_id: Getter<Link, ThisId>,
    link_other_id: Getter<Link, OtherId>,
    assign: AssignOthers<This, Other>,
    children: GetSpecification<Other>,
}

impl<This, Other, Link, ThisId, OtherId> ManyToManyIncludeSpecification<This, Other, Link, ThisId, OtherId>
where
    This: Entity,
    Other: Entity,
    Link: Entity,
    ThisId: Clone + Eq + Hash + Send + Sync + 'static,
    OtherId: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn builder() -> ManyToManyIncludeBuilder<This, Other, Link, ThisId, OtherId> {
        ManyToManyIncludeBuilder::new()
    }

    pub fn children(&self) -> &GetSpecification<Other> {
        &self.children
    }
}

impl<This, Other: Entity, Link, ThisId, OtherId> Clone
    for ManyToManyIncludeSpecification<This, Other, Link, ThisId, OtherId>
{
    fn clone(&self) -> Self {
        Self {
            this_id: self.this_id.clone(),
            other_id: self.other_id.clone(),
            link_this_id: self.link_this_id.clone(),
            link_other_id: self.link_other_id.clone(),
            assign: Arc::clone(&self.assign),
            children: self.children.clone(),
        }
    }
}

impl<This, Other: Entity, Link, ThisId, OtherId> fmt::Debug
    for ManyToManyIncludeSpecification<This, Other, Link, ThisId, OtherId>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyToManyIncludeSpecification")
            .field("other", &Other::entity_name())
            .field("link", &std::any::type_name::<Link>())
            .field("children", &self.children)
            .finish()
    }
}

#[async_trait]
impl<This, Other, Link, ThisId, OtherId> ManyToManyInclude<This>
    for ManyToManyIncludeSpecification<This, Other, Link, ThisId, OtherId>
where
    This: Entity,
    Other: Entity,
    Link: Entity,
    ThisId: Clone + Eq + Hash + Send + Sync + 'static,
    OtherId: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn depth(&self) -> usize {
        1 + self.children.depth()
    }

    async fn load(
        &self,
        resolver: &RelationshipResolver<'_>,
        this: &mut [This],
        cancel: &CancellationToken,
    ) -> RepositoryResult<()> {
        if this.is_empty() {
            return Ok(());
        }

        let this_ids: HashSet<ThisId> = this.iter().map(|entity| self.this_id.get(entity)).collect();

        let link_this_id = self.link_this_id.clone();
        let links_query =
            Query::<Link>::new().filter(move |link| this_ids.contains(&link_this_id.get(link)));
        let links = resolver.fetch(&links_query, cancel).await?;

        let mut linked: HashMap<ThisId, HashSet<OtherId>> = HashMap::new();
        let mut other_ids: HashSet<OtherId> = HashSet::new();
        for link in &links {
            let other_id = self.link_other_id.get(link);
            other_ids.insert(other_id.clone());
            linked
                .entry(self.link_this_id.get(link))
                .or_default()
                .insert(other_id);
        }

        let others = if other_ids.is_empty() {
            Vec::new()
        } else {
            let other_id = self.other_id.clone();
            let others_query =
                Query::<Other>::new().filter(move |other| other_ids.contains(&other_id.get(other)));
            let mut others = resolver.fetch(&others_query, cancel).await?;
            resolver.load_includes(others.as_mut_slice(), &self.children, cancel).await?;
            others
        };

        debug!(
            "Resolved {} {} rows through {} links for {} {} rows",
            others.len(),
            Other::entity_name(),
            links.len(),
            this.len(),
            This::entity_name()
        );

        for entity in this.iter_mut() {
            let collection: Vec<Other> = match linked.get(&self.this_id.get(entity)) {
                Some(ids) => others
                    .iter()
                    .filter(|other| ids.contains(&self.other_id.get(other)))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            };
            (self.assign)(entity, collection);
        }
        Ok(())
    }
}

/// Builder for `ManyToManyIncludeSpecification`
///
/// Every selector is required; `build` reports the first missing one.
pub struct ManyToManyIncludeBuilder<This, Other: Entity, Link, ThisId, OtherId> {
    this_id: Option<Getter<This, ThisId>>,
    other_id: Option<Getter<Other, OtherId>>,
    link_this_id: Option<Getter<Link, ThisId>>,
    link_other_id: Option<Getter<Link, OtherId>>,
    assign: Option<AssignOthers<This, Other>>,
    children: GetSpecification<Other>,
}

impl<This, Other, Link, ThisId, OtherId> Default for ManyToManyIncludeBuilder<This, Other, Link, ThisId, OtherId>
where
    Other: Entity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<This, Other, Link, ThisId, OtherId> ManyToManyIncludeBuilder<This, Other, Link, ThisId, OtherId>
where
    Other: Entity,
{
    pub fn new() -> Self {
        Self {
            this_id: None,
            other_id: None,
            link_this_id: None,
            link_other_id: None,
            assign: None,
            children: GetSpecification::new(),
        }
    }

    /// Id of a "this" row
    pub fn this_id<F>(mut self, selector: F) -> Self
    where
        F: Fn(&This) -> ThisId + Send + Sync + 'static,
    {
        self.this_id = Some(Getter::new(selector));
        self
    }

    /// Id of an "other" row
    pub fn other_id<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Other) -> OtherId + Send + Sync + 'static,
    {
        self.other_id = Some(Getter::new(selector));
        self
    }

    /// Link foreign key pointing at "this"
    pub fn link_to_this<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Link) -> ThisId + Send + Sync + 'static,
    {
        self.link_this_id = Some(Getter::new(selector));
        self
    }

    /// Link foreign key pointing at "other"
    pub fn link_to_other<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Link) -> OtherId + Send + Sync + 'static,
    {
        self.link_other_id = Some(Getter::new(selector));
        self
    }

    /// Where the resolved collection is stored on "this"
    pub fn others<F>(mut self, assign: F) -> Self
    where
        F: Fn(&mut This, Vec<Other>) + Send + Sync + 'static,
    {
        self.assign = Some(Arc::new(assign));
        self
    }

    /// Includes applied to the resolved "other" rows
    pub fn children(mut self, children: GetSpecification<Other>) -> Self {
        self.children = children;
        self
    }

    pub fn build(
        self,
    ) -> Result<ManyToManyIncludeSpecification<This, Other, Link, ThisId, OtherId>, SpecificationError> {
        Ok(ManyToManyIncludeSpecification {
            this_id: self.this_id.ok_or(SpecificationError::MissingSelector("this_id"))?,
            other_id: self.other_id.ok_or(SpecificationError::MissingSelector("other_id"))?,
            link_this_id: self
                .link_this_id
                .ok_or(SpecificationError::MissingSelector("link_to_this"))?,
            link_other_id: self
                .link_other_id
                .ok_or(SpecificationError::MissingSelector("link_to_other"))?,
            assign: self.assign.ok_or(SpecificationError::MissingSelector("others"))?,
            children: self.children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Article, ArticleCategory, Category};

    #[test]
    fn test_build_reports_missing_selector() {
        let result = ManyToManyIncludeSpecification::<Article, Category, ArticleCategory, u64, u64>::builder()
            .this_id(|a: &Article| a.id)
            .other_id(|c: &Category| c.id)
            .link_to_this(|l: &ArticleCategory| l.article_id)
            .others(|a: &mut Article, categories: Vec<Category>| a.categories = categories)
            .build();

        assert_eq!(
            result.err(),
            Some(SpecificationError::MissingSelector("link_to_other"))
        );
    }

    #[test]
    fn test_build_with_all_selectors() {
        let spec = ManyToManyIncludeSpecification::<Article, Category, ArticleCategory, u64, u64>::builder()
            .this_id(|a: &Article| a.id)
            .other_id(|c: &Category| c.id)
            .link_to_this(|l: &ArticleCategory| l.article_id)
            .link_to_other(|l: &ArticleCategory| l.category_id)
            .others(|a: &mut Article, categories: Vec<Category>| a.categories = categories)
            .build()
            .expect("all selectors supplied");

        assert_eq!(spec.depth(), 1);
        assert!(spec.children().is_empty());
    }
}
