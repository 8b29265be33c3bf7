use std::collections::BTreeSet;
use std::sync::Arc;

use elif_repository::{
    Accessor, CancellationToken, Entity, EntityManager, FindSpecification, FlushMode, GetSpecification,
    HookSet, ManyToManyIncludeSpecification, ManyToManyRelationshipSpecification, MemoryStore,
    ModifySpecification, OneToManyRelationship, OneToManyRelationshipSpecification,
    PagedSearchSpecification, Reference, Repository, RepositoryConfig, RepositoryConfigBuilder,
    RepositoryError, SearchSpecification,
};
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Supplier {
    id: u32,
    name: String,
}

impl Entity for Supplier {
    type Key = u32;

    fn entity_name() -> &'static str {
        "Supplier"
    }

    fn key(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Product {
    id: u32,
    sku: String,
    supplier_id: Option<u32>,
    supplier: Option<Supplier>,
    tags: Vec<Tag>,
    price_cents: u64,
}

impl Product {
    fn new(id: u32, sku: &str, supplier_id: Option<u32>, price_cents: u64) -> Self {
        Self {
            id,
            sku: sku.to_string(),
            supplier_id,
            supplier: None,
            tags: Vec::new(),
            price_cents,
        }
    }

    fn tagged(mut self, tag_ids: &[u32]) -> Self {
        self.tags = tag_ids.iter().map(|id| Tag::new(*id, "")).collect();
        self
    }
}

impl Entity for Product {
    type Key = u32;

    fn entity_name() -> &'static str {
        "Product"
    }

    fn key(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tag {
    id: u32,
    label: String,
    products: Vec<Product>,
}

impl Tag {
    fn new(id: u32, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            products: Vec::new(),
        }
    }
}

impl Entity for Tag {
    type Key = u32;

    fn entity_name() -> &'static str {
        "Tag"
    }

    fn key(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ProductTag {
    product_id: u32,
    tag_id: u32,
}

impl Entity for ProductTag {
    type Key = (u32, u32);

    fn entity_name() -> &'static str {
        "ProductTag"
    }

    fn key(&self) -> (u32, u32) {
        (self.product_id, self.tag_id)
    }
}

fn product_supplier() -> Reference<Product, Supplier> {
    Reference::new(
        "supplier",
        |p: &Product| p.supplier_id,
        |p: &mut Product, supplier: Option<Supplier>| p.supplier = supplier,
    )
}

fn product_tags(
    children: GetSpecification<Tag>,
) -> ManyToManyIncludeSpecification<Product, Tag, ProductTag, u32, u32> {
    ManyToManyIncludeSpecification::builder()
        .this_id(|p: &Product| p.id)
        .other_id(|t: &Tag| t.id)
        .link_to_this(|l: &ProductTag| l.product_id)
        .link_to_other(|l: &ProductTag| l.tag_id)
        .others(|p: &mut Product, tags: Vec<Tag>| p.tags = tags)
        .children(children)
        .build()
        .unwrap()
}

fn tag_products(
    children: GetSpecification<Product>,
) -> ManyToManyIncludeSpecification<Tag, Product, ProductTag, u32, u32> {
    ManyToManyIncludeSpecification::builder()
        .this_id(|t: &Tag| t.id)
        .other_id(|p: &Product| p.id)
        .link_to_this(|l: &ProductTag| l.tag_id)
        .link_to_other(|l: &ProductTag| l.product_id)
        .others(|t: &mut Tag, products: Vec<Product>| t.products = products)
        .children(children)
        .build()
        .unwrap()
}

fn product_modify() -> ModifySpecification<Product> {
    ModifySpecification::new()
        .with_one_to_many(OneToManyRelationshipSpecification::new(
            Accessor::new(
                |p: &Product| p.supplier_id,
                |p: &mut Product, id: Option<u32>| p.supplier_id = id,
            ),
            |p: &Product| p.supplier.as_ref().map(|s| s.id),
            |p: &mut Product| p.supplier = None,
        ))
        .with_many_to_many(
            ManyToManyRelationshipSpecification::builder()
                .this_id(|p: &Product| p.id)
                .other_ids(|p: &Product| p.tags.iter().map(|t| t.id).collect())
                .link_to_this(|l: &ProductTag| l.product_id)
                .link_to_other(|l: &ProductTag| l.tag_id)
                .link_factory(|product_id, tag_id| ProductTag { product_id, tag_id })
                .build()
                .unwrap(),
        )
}

fn empty_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_entity::<Supplier>()
            .with_entity::<Product>()
            .with_entity::<Tag>()
            .with_entity::<ProductTag>(),
    )
}

/// Product 1 carries tags 1 and 2; tag 1 is shared by products 1, 2 and 3
fn catalog_store() -> Arc<MemoryStore> {
    let store = empty_store();
    store.register_path::<Product, _>(product_supplier());
    store
        .seed(vec![
            Supplier { id: 1, name: "Acme".to_string() },
            Supplier { id: 2, name: "Globex".to_string() },
        ])
        .unwrap();
    store
        .seed(vec![
            Product::new(1, "BOLT", Some(1), 120),
            Product::new(2, "NUT", Some(2), 40),
            Product::new(3, "SCREW", Some(1), 80),
            Product::new(4, "WASHER", None, 10),
        ])
        .unwrap();
    store
        .seed(vec![Tag::new(1, "hardware"), Tag::new(2, "sale")])
        .unwrap();
    store
        .seed(vec![
            ProductTag { product_id: 1, tag_id: 1 },
            ProductTag { product_id: 1, tag_id: 2 },
            ProductTag { product_id: 2, tag_id: 1 },
            ProductTag { product_id: 3, tag_id: 1 },
        ])
        .unwrap();
    store
}

fn linked_tags(store: &MemoryStore, product_id: u32) -> BTreeSet<u32> {
    store
        .rows::<ProductTag>()
        .unwrap()
        .into_iter()
        .filter(|link| link.product_id == product_id)
        .map(|link| link.tag_id)
        .collect()
}

#[tokio::test]
async fn test_nested_includes_populate_every_level() {
    let store = catalog_store();
    let repository = Repository::<Product>::new(store.clone());
    let spec = FindSpecification::<Product>::by_key(1).with_includes(
        GetSpecification::new().with_many_to_many(product_tags(
            GetSpecification::new().with_many_to_many(tag_products(
                GetSpecification::new().with_include_path("supplier"),
            )),
        )),
    );

    let product = repository
        .find_required(&spec, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(product.tags.len(), 2);
    let hardware = product.tags.iter().find(|t| t.label == "hardware").unwrap();
    assert_eq!(hardware.products.len(), 3);
    assert!(hardware.products.iter().all(|p| p.supplier.is_some()));
}

#[tokio::test]
async fn test_paging_small_result_set() {
    let store = catalog_store();
    let repository = Repository::<Product>::new(store);
    let spec = PagedSearchSpecification::from_search(
        SearchSpecification::<Product>::new().with_criteria(|p: &Product| p.supplier_id.is_some()),
    )
    .paginate(10, 1);

    let page = repository
        .paged_search(&spec, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(page.total_count, 4);
    assert_eq!(page.result_count, 3);
    assert_eq!(page.results.len(), 3);
}

#[tokio::test]
async fn test_multi_key_ordering() {
    let store = catalog_store();
    let repository = Repository::<Product>::new(store);
    let spec = SearchSpecification::<Product>::new()
        .order_by(|p: &Product| p.supplier_id)
        .order_by_desc(|p: &Product| p.price_cents);

    let products = repository
        .search(&spec, &CancellationToken::new())
        .await
        .unwrap();
    let skus: Vec<&str> = products.iter().map(|p| p.sku.as_str()).collect();
    assert_eq!(skus, vec!["WASHER", "BOLT", "SCREW", "NUT"]);
}

#[tokio::test]
async fn test_manager_round_trip_with_hooks() {
    let store = catalog_store();
    let manager = EntityManager::builder(Repository::<Product>::new(store.clone()))
        .with_modify(product_modify())
        .with_hooks(
            "sku",
            HookSet::code_normalization(Accessor::new(
                |p: &Product| p.sku.clone(),
                |p: &mut Product, sku: String| p.sku = sku,
            )),
        )
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let mut product = Product::new(5, " rivet ", None, 15).tagged(&[2]);
    product.supplier = Some(Supplier { id: 2, name: "Globex".to_string() });
    let created = manager.create(product, &cancel).await.unwrap();
    assert_eq!(created.sku, "RIVET");
    assert_eq!(created.supplier_id, Some(2));
    assert_eq!(linked_tags(&store, 5), BTreeSet::from([2]));

    let updated = manager
        .update(Product::new(5, "rivet", Some(2), 15).tagged(&[1]), &cancel)
        .await
        .unwrap();
    assert_eq!(updated.sku, "RIVET");
    assert_eq!(linked_tags(&store, 5), BTreeSet::from([1]));

    let removed = manager.delete(&5, &cancel).await.unwrap();
    assert_eq!(removed.id, 5);
    let missing = manager
        .repository()
        .find(&FindSpecification::<Product>::by_key(5), &cancel)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_per_step_mode_from_yaml() {
    let config = RepositoryConfig::from_yaml_str("flush_mode: per_step\nmax_include_depth: 3\n").unwrap();
    assert_eq!(*config.get_flush_mode(), FlushMode::PerStep);
    assert_eq!(*config.get_max_page_size(), 0);

    let store = catalog_store();
    let repository = Repository::<Product>::with_config(store.clone(), config);
    repository
        .update(
            Product::new(1, "BOLT", Some(1), 120).tagged(&[3]),
            &product_modify(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // Row replacement, link inserts and link removals each flush once
    assert_eq!(store.flush_count(), 3);
    assert_eq!(linked_tags(&store, 1), BTreeSet::from([3]));
}

#[tokio::test]
async fn test_oversized_page_is_a_configuration_error() {
    let config = RepositoryConfigBuilder::production().build().unwrap();
    let repository = Repository::<Product>::with_config(catalog_store(), config);
    let spec = PagedSearchSpecification::<Product>::new().paginate(1000, 1);

    let err = repository
        .paged_search(&spec, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Configuration(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_conflicts_share_one_store() {
    for _ in 0..10 {
        let store = empty_store();
        store
            .seed((0..100u32).step_by(2).map(|id| Product::new(id, "SEEDED", None, 1)))
            .unwrap();
        let repository = Repository::<Product>::new(store.clone());
        let modify = product_modify();

        let mut handles = Vec::new();
        for id in 0..100u32 {
            let repository = repository.clone();
            let modify = modify.clone();
            handles.push(tokio::spawn(async move {
                let product = Product::new(id, "P", None, 1).tagged(&[id % 3]);
                let result = repository
                    .create(product, &modify, &CancellationToken::new())
                    .await;
                (id, result)
            }));
        }

        let mut created = BTreeSet::new();
        for handle in handles {
            let (id, result) = handle.await.unwrap();
            match result {
                Ok(product) => {
                    assert_eq!(product.id, id);
                    created.insert(id);
                }
                Err(err) => {
                    assert!(matches!(err, RepositoryError::Conflict { .. }), "{:?}", err);
                    assert_eq!(id % 2, 0);
                }
            }
        }

        // Every acknowledged create is persisted with its link
        let expected: BTreeSet<u32> = (1..100u32).step_by(2).collect();
        assert_eq!(created, expected);
        let persisted: BTreeSet<u32> = store
            .rows::<Product>()
            .unwrap()
            .into_iter()
            .filter(|product| product.sku == "P")
            .map(|product| product.id)
            .collect();
        assert_eq!(persisted, expected);
        let linked: BTreeSet<u32> = store
            .rows::<ProductTag>()
            .unwrap()
            .into_iter()
            .map(|link| link.product_id)
            .collect();
        assert_eq!(linked, expected);
    }
}

proptest! {
    #[test]
    fn prop_link_update_converges_to_navigation_ids(
        initial in proptest::collection::btree_set(0u32..10, 0..6),
        desired in proptest::collection::vec(0u32..10, 0..8),
        per_step in any::<bool>(),
    ) {
        let store = empty_store();
        store.seed(vec![Product::new(1, "P", None, 1)]).unwrap();
        store
            .seed(initial.iter().map(|tag_id| ProductTag { product_id: 1, tag_id: *tag_id }))
            .unwrap();

        let config = RepositoryConfigBuilder::new()
            .flush_mode(if per_step { FlushMode::PerStep } else { FlushMode::Batched })
            .build()
            .unwrap();
        let repository = Repository::<Product>::with_config(store.clone(), config);
        let product = Product::new(1, "P", None, 1).tagged(&desired);
        let expected: BTreeSet<u32> = desired.iter().copied().collect();

        for _ in 0..2 {
            tokio_test::block_on(repository.update(product.clone(), &product_modify(), &CancellationToken::new()))
                .unwrap();
            prop_assert_eq!(linked_tags(&store, 1), expected.clone());
        }
    }

    #[test]
    fn prop_explicit_foreign_key_wins(
        fk in proptest::option::of(0u32..5),
        parent in proptest::option::of(1u32..5),
    ) {
        let relationship = OneToManyRelationshipSpecification::new(
            Accessor::new(
                |p: &Product| p.supplier_id,
                |p: &mut Product, id: Option<u32>| p.supplier_id = id,
            ),
            |p: &Product| p.supplier.as_ref().map(|s| s.id),
            |p: &mut Product| p.supplier = None,
        );
        let mut product = Product::new(1, "P", fk, 1);
        product.supplier = parent.map(|id| Supplier { id, name: "S".to_string() });

        relationship.prepare(&mut product);

        match (fk, parent) {
            (Some(value), _) if value != 0 => prop_assert_eq!(product.supplier_id, Some(value)),
            (_, Some(parent_id)) => prop_assert_eq!(product.supplier_id, Some(parent_id)),
            (unset, None) => prop_assert_eq!(product.supplier_id, unset),
        }
    }
}
