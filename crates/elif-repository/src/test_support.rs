//! Blog fixtures shared by unit tests

use crate::entity::{Accessor, Entity};
use crate::specification::{
    Collection, GetSpecification, ManyToManyIncludeSpecification, ManyToManyRelationshipSpecification,
    OneToManyRelationshipSpecification, Reference,
};
use crate::store::MemoryStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: u64,
    pub name: String,
}

impl Author {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Entity for Author {
    type Key = u64;

    fn entity_name() -> &'static str {
        "Author"
    }

    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub article_id: u64,
    pub body: String,
}

impl Comment {
    pub fn new(id: u64, article_id: u64, body: &str) -> Self {
        Self {
            id,
            article_id,
            body: body.to_string(),
        }
    }
}

impl Entity for Comment {
    type Key = u64;

    fn entity_name() -> &'static str {
        "Comment"
    }

    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: u64,
    pub code: String,
    pub name: String,
    pub articles: Vec<Article>,
}

impl Category {
    pub fn new(id: u64, code: &str, name: &str) -> Self {
        Self {
            id,
            code: code.to_string(),
            name: name.to_string(),
            articles: Vec::new(),
        }
    }
}

impl Entity for Category {
    type Key = u64;

    fn entity_name() -> &'static str {
        "Category"
    }

    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub author_id: Option<u64>,
    pub author: Option<Author>,
    pub comments: Vec<Comment>,
    pub categories: Vec<Category>,
    pub views: u32,
}

impl Article {
    pub fn new(id: u64, title: impl Into<String>, author_id: Option<u64>) -> Self {
        Self {
            id,
            title: title.into(),
            author_id,
            author: None,
            comments: Vec::new(),
            categories: Vec::new(),
            views: 0,
        }
    }

    pub fn with_views(mut self, views: u32) -> Self {
        self.views = views;
        self
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }
}

impl Entity for Article {
    type Key = u64;

    fn entity_name() -> &'static str {
        "Article"
    }

    fn key(&self) -> u64 {
        self.id
    }
}

/// Junction row between articles and categories
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleCategory {
    pub article_id: u64,
    pub category_id: u64,
}

impl ArticleCategory {
    pub fn new(article_id: u64, category_id: u64) -> Self {
        Self {
            article_id,
            category_id,
        }
    }
}

impl Entity for ArticleCategory {
    type Key = (u64, u64);

    fn entity_name() -> &'static str {
        "ArticleCategory"
    }

    fn key(&self) -> (u64, u64) {
        (self.article_id, self.category_id)
    }
}

pub fn article_author() -> Reference<Article, Author> {
    Reference::new(
        "author",
        |a: &Article| a.author_id,
        |a: &mut Article, author: Option<Author>| a.author = author,
    )
}

pub fn article_comments() -> Collection<Article, Comment, u64> {
    Collection::new(
        "comments",
        |a: &Article| a.id,
        |c: &Comment| c.article_id,
        |a: &mut Article, comments: Vec<Comment>| a.comments = comments,
    )
}

pub fn article_categories(
    children: GetSpecification<Category>,
) -> ManyToManyIncludeSpecification<Article, Category, ArticleCategory, u64, u64> {
    ManyToManyIncludeSpecification::builder()
        .this_id(|a: &Article| a.id)
        .other_id(|c: &Category| c.id)
        .link_to_this(|l: &ArticleCategory| l.article_id)
        .link_to_other(|l: &ArticleCategory| l.category_id)
        .others(|a: &mut Article, categories: Vec<Category>| a.categories = categories)
        .children(children)
        .build()
        .expect("article categories include")
}

pub fn category_articles(
    children: GetSpecification<Article>,
) -> ManyToManyIncludeSpecification<Category, Article, ArticleCategory, u64, u64> {
    ManyToManyIncludeSpecification::builder()
        .this_id(|c: &Category| c.id)
        .other_id(|a: &Article| a.id)
        .link_to_this(|l: &ArticleCategory| l.category_id)
        .link_to_other(|l: &ArticleCategory| l.article_id)
        .others(|c: &mut Category, articles: Vec<Article>| c.articles = articles)
        .children(children)
        .build()
        .expect("category articles include")
}

pub fn article_author_fk() -> OneToManyRelationshipSpecification<Article, u64> {
    OneToManyRelationshipSpecification::new(
        Accessor::new(
            |a: &Article| a.author_id,
            |a: &mut Article, id: Option<u64>| a.author_id = id,
        ),
        |a: &Article| a.author.as_ref().map(|author| author.id),
        |a: &mut Article| a.author = None,
    )
}

pub fn article_category_links() -> ManyToManyRelationshipSpecification<Article, ArticleCategory, u64, u64> {
    ManyToManyRelationshipSpecification::builder()
        .this_id(|a: &Article| a.id)
        .other_ids(|a: &Article| a.categories.iter().map(|c| c.id).collect())
        .link_to_this(|l: &ArticleCategory| l.article_id)
        .link_to_other(|l: &ArticleCategory| l.category_id)
        .link_factory(ArticleCategory::new)
        .build()
        .expect("article category links")
}

pub fn category_code() -> Accessor<Category, String> {
    Accessor::new(
        |c: &Category| c.code.clone(),
        |c: &mut Category, code: String| c.code = code,
    )
}

pub fn category_name() -> Accessor<Category, String> {
    Accessor::new(
        |c: &Category| c.name.clone(),
        |c: &mut Category, name: String| c.name = name,
    )
}

/// Category ids linked to an article, sorted
pub fn linked_category_ids(store: &MemoryStore, article_id: u64) -> Vec<u64> {
    let mut ids: Vec<u64> = store
        .rows::<ArticleCategory>()
        .expect("link set registered")
        .into_iter()
        .filter(|link| link.article_id == article_id)
        .map(|link| link.category_id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Two authors, four articles, three comments, two categories
///
/// Article 1 is linked to RUST and WEB, articles 2 and 3 to RUST only.
/// Article 4 has no author, comments or categories.
pub fn blog_store() -> MemoryStore {
    let store = MemoryStore::new()
        .with_entity::<Author>()
        .with_entity::<Article>()
        .with_entity::<Comment>()
        .with_entity::<Category>()
        .with_entity::<ArticleCategory>();
    store.register_path::<Article, _>(article_author());

    store
        .seed(vec![Author::new(1, "Ferris"), Author::new(2, "Ada")])
        .expect("seed authors");
    store
        .seed(vec![
            Article::new(1, "Ownership", Some(1)).with_views(20),
            Article::new(2, "Lifetimes", Some(2)).with_views(30),
            Article::new(3, "Traits", Some(1)).with_views(5),
            Article::new(4, "Draft", None),
        ])
        .expect("seed articles");
    store
        .seed(vec![
            Comment::new(1, 1, "Great read"),
            Comment::new(2, 1, "Thanks"),
            Comment::new(3, 2, "Nice"),
        ])
        .expect("seed comments");
    store
        .seed(vec![Category::new(1, "RUST", "Rust"), Category::new(2, "WEB", "Web")])
        .expect("seed categories");
    store
        .seed(vec![
            ArticleCategory::new(1, 1),
            ArticleCategory::new(1, 2),
            ArticleCategory::new(2, 1),
            ArticleCategory::new(3, 1),
        ])
        .expect("seed links");
    store
}
