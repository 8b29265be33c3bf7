//! Mutate path - foreign key preparation and link synchronisation

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ensure_active, RelationshipResolver};
use crate::config::FlushMode;
use crate::entity::Entity;
use crate::error::RepositoryResult;
use crate::specification::{ModifySpecification, RelationshipChanges};
use crate::store::UnitOfWork;

impl<'a> RelationshipResolver<'a> {
    /// Rewrite one-to-many foreign keys from their parent navigations
    ///
    /// Returns how many foreign keys were taken from a navigation.
    pub fn prepare_one_to_many<E: Entity>(&self, entity: &mut E, spec: &ModifySpecification<E>) -> usize {
        spec.one_to_many()
            .iter()
            .filter(|relationship| relationship.prepare(entity))
            .count()
    }

    /// Stage the link rows of a freshly created entity
    pub async fn add_many_to_many<E: Entity>(
        &self,
        entity: &E,
        spec: &ModifySpecification<E>,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<RelationshipChanges> {
        let mut changes = RelationshipChanges::default();
        for relationship in spec.many_to_many() {
            changes += relationship.add(self, entity, work, cancel).await?;
        }
        Ok(changes)
    }

    /// Stage the link changes that bring persisted links in line with the navigations
    pub async fn update_many_to_many<E: Entity>(
        &self,
        entity: &E,
        spec: &ModifySpecification<E>,
        work: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> RepositoryResult<RelationshipChanges> {
        let mut changes = RelationshipChanges::default();
        for relationship in spec.many_to_many() {
            changes += relationship.update(self, entity, work, cancel).await?;
        }
        Ok(changes)
    }

    /// Flush the unit of work when running in `PerStep` mode
    pub async fn flush_step(&self, work: &UnitOfWork, cancel: &CancellationToken) -> RepositoryResult<()> {
        if *self.config.get_flush_mode() == FlushMode::PerStep {
            ensure_active(cancel)?;
            let affected = self.store.save_changes(work).await?;
            debug!("Per-step flush wrote {} changes", affected);
        }
        Ok(())
    }

    /// Flush whatever the unit of work still holds; the closing step of every mutation
    pub async fn commit(&self, work: &UnitOfWork, cancel: &CancellationToken) -> RepositoryResult<usize> {
        if work.is_empty() {
            return Ok(0);
        }
        ensure_active(cancel)?;
        self.store.save_changes(work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepositoryConfig, RepositoryConfigBuilder};
    use crate::test_support::{
        article_author_fk, article_category_links, blog_store, linked_category_ids, Article, Author,
        Category,
    };

    fn article_with_categories(id: u64, categories: &[u64]) -> Article {
        let mut article = Article::new(id, "Linked", Some(1));
        article.categories = categories
            .iter()
            .map(|c| Category::new(*c, "C", "C"))
            .collect();
        article
    }

    #[tokio::test]
    async fn test_update_applies_full_set_diff() {
        let store = blog_store();
        let config = RepositoryConfig::default();
        let resolver = RelationshipResolver::new(&store, &config);
        let cancel = CancellationToken::new();
        let spec = ModifySpecification::new().with_many_to_many(article_category_links());

        // Article 1 is linked to categories 1 and 2
        let article = article_with_categories(1, &[2, 3, 3]);
        let work = UnitOfWork::new();
        let changes = resolver
            .update_many_to_many(&article, &spec, &work, &cancel)
            .await
            .unwrap();
        resolver.commit(&work, &cancel).await.unwrap();

        assert_eq!(changes, RelationshipChanges { added: 1, removed: 1 });
        assert_eq!(linked_category_ids(&store, 1), vec![2, 3]);

        // Same input again changes nothing
        let work = UnitOfWork::new();
        let changes = resolver
            .update_many_to_many(&article, &spec, &work, &cancel)
            .await
            .unwrap();
        assert_eq!(changes, RelationshipChanges::default());
        assert!(work.is_empty());
        assert_eq!(resolver.commit(&work, &cancel).await.unwrap(), 0);
        assert_eq!(linked_category_ids(&store, 1), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_per_step_mode_flushes_each_pass() {
        let store = blog_store();
        let config = RepositoryConfigBuilder::new()
            .flush_mode(FlushMode::PerStep)
            .build()
            .unwrap();
        let resolver = RelationshipResolver::new(&store, &config);
        let cancel = CancellationToken::new();
        let spec = ModifySpecification::new().with_many_to_many(article_category_links());

        let article = article_with_categories(1, &[2]);
        let work = UnitOfWork::new();
        resolver
            .update_many_to_many(&article, &spec, &work, &cancel)
            .await
            .unwrap();

        // Nothing to add, one removal pass
        assert_eq!(store.flush_count(), 1);
        assert!(work.is_empty());
        assert_eq!(linked_category_ids(&store, 1), vec![2]);
    }

    #[tokio::test]
    async fn test_add_links_new_entity() {
        let store = blog_store();
        let config = RepositoryConfig::default();
        let resolver = RelationshipResolver::new(&store, &config);
        let cancel = CancellationToken::new();
        let spec = ModifySpecification::new().with_many_to_many(article_category_links());

        let article = article_with_categories(10, &[1, 2, 1]);
        let work = UnitOfWork::new();
        let changes = resolver
            .add_many_to_many(&article, &spec, &work, &cancel)
            .await
            .unwrap();
        assert_eq!(work.len(), 2);
        assert_eq!(resolver.commit(&work, &cancel).await.unwrap(), 2);

        assert_eq!(changes.added, 2);
        assert_eq!(linked_category_ids(&store, 10), vec![1, 2]);
    }

    #[test]
    fn test_prepare_counts_rewritten_keys() {
        let store = blog_store();
        let config = RepositoryConfig::default();
        let resolver = RelationshipResolver::new(&store, &config);
        let spec = ModifySpecification::new().with_one_to_many(article_author_fk());

        let mut article = Article::new(10, "New", None).with_author(Author::new(2, "Ada"));
        assert_eq!(resolver.prepare_one_to_many(&mut article, &spec), 1);
        assert_eq!(article.author_id, Some(2));
    }
}
