//! Specification Model - Declarative descriptions of what to fetch and persist
//!
//! Specifications are built per call by the caller, carry no resolver state
//! and can be cloned and reused as read-only templates.

pub mod find;
pub mod get;
pub mod include;
pub mod many_to_many;
pub mod modify;
pub mod order;
pub mod search;

pub use find::FindSpecification;
pub use get::GetSpecification;
pub use include::{Collection, NavigationInclude, Reference};
pub use many_to_many::{ManyToManyInclude, ManyToManyIncludeBuilder, ManyToManyIncludeSpecification};
pub use modify::{
    ManyToManyRelationship, ManyToManyRelationshipBuilder, ManyToManyRelationshipSpecification,
    ModifySpecification, OneToManyRelationship, OneToManyRelationshipSpecification, RelationshipChanges,
};
pub use order::{compare_all, OrderSpecification};
pub use search::{PagedSearchSpecification, SearchSpecification};
