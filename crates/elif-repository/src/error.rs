//! Error types for the repository layer
//!
//! Every fallible operation returns `RepositoryResult`. Specification build
//! failures are reported as `SpecificationError` and surface to callers as
//! `RepositoryError::Configuration`.

use thiserror::Error;

use crate::entity::Entity;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{entity} with key {key} already exists")]
    Conflict { entity: &'static str, key: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No entity set registered for {0}")]
    UnknownEntitySet(&'static str),

    #[error("Unknown include path '{path}' on {entity}")]
    UnknownIncludePath { entity: &'static str, path: String },
}

impl RepositoryError {
    /// Not-found error for an entity key
    pub fn not_found<E: Entity>(key: &E::Key) -> Self {
        RepositoryError::NotFound {
            entity: E::entity_name(),
            key: format!("{:?}", key),
        }
    }

    /// Conflict error for an entity key
    pub fn conflict<E: Entity>(key: &E::Key) -> Self {
        RepositoryError::Conflict {
            entity: E::entity_name(),
            key: format!("{:?}", key),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Errors raised while building or validating a specification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecificationError {
    #[error("Missing required selector: {0}")]
    MissingSelector(&'static str),

    #[error("Page number must be 1 or greater, got {0}")]
    InvalidPageNumber(u64),

    #[error("Page size {requested} exceeds the configured maximum of {max}")]
    PageSizeTooLarge { requested: u64, max: u64 },

    #[error("Include depth {depth} exceeds the configured maximum of {max}")]
    IncludeDepthExceeded { depth: usize, max: usize },

    #[error("Hook set '{0}' is already registered")]
    DuplicateHookSet(String),
}

impl From<SpecificationError> for RepositoryError {
    fn from(err: SpecificationError) -> Self {
        RepositoryError::Configuration(err.to_string())
    }
}
