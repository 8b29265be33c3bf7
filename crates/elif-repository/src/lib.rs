//! # elif-repository
//!
//! Specification-driven repositories for the elif.rs framework.
//!
//! ## Features
//!
//! - **Specification model**: declarative descriptions of what to fetch
//!   (`GetSpecification`, `SearchSpecification`, `PagedSearchSpecification`,
//!   `FindSpecification`) and what to persist (`ModifySpecification`)
//! - **Relationship materialization**: navigation includes, named include
//!   paths and nested many-to-many includes resolved against any store
//! - **Relationship persistence**: one-to-many foreign key preparation and
//!   many-to-many link synchronisation on create and update
//! - **Paging pipeline**: scope criteria, totals, criteria, ordering, paging
//! - **Lifecycle hooks**: capability modules composed into an `EntityManager`
//! - **Memory store**: in-process `QueryableStore` for development and tests

pub mod config;
pub mod entity;
pub mod error;
pub mod manager;
pub mod repository;
pub mod resolver;
pub mod specification;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::*;
pub use entity::*;
pub use error::*;
pub use manager::*;
pub use repository::*;
pub use resolver::*;
pub use specification::*;
pub use store::*;

pub use tokio_util::sync::CancellationToken;
