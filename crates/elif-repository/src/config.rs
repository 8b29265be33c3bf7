//! Repository configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;

use crate::error::{RepositoryError, RepositoryResult};

/// When staged relationship mutations are written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Flush after every mutation pass (entity row, link inserts, link removals)
    PerStep,
    /// Stage everything and flush once when the operation completes
    #[default]
    Batched,
}

/// Configuration for repositories and the relationship resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[builder]
pub struct RepositoryConfig {
    /// Flush policy for create/update/delete
    #[builder(default = "FlushMode::Batched", getter)]
    pub flush_mode: FlushMode,

    /// Maximum nesting depth of include specifications
    #[builder(default = "8", getter)]
    pub max_include_depth: usize,

    /// Maximum accepted page size (0 = unlimited)
    #[builder(default = "0", getter)]
    pub max_page_size: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Batched,
            max_include_depth: 8,
            max_page_size: 0,
        }
    }
}

impl RepositoryConfig {
    /// Load a configuration from a YAML document; missing keys keep their defaults
    pub fn from_yaml_str(content: &str) -> RepositoryResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| RepositoryError::Configuration(format!("Invalid repository config: {}", e)))
    }
}

impl RepositoryConfigBuilder {
    /// Development configuration: per-step flushes make intermediate state visible
    pub fn development() -> Self {
        RepositoryConfigBuilder::new()
            .flush_mode(FlushMode::PerStep)
            .max_include_depth(16)
    }

    /// Production configuration with a bounded page size
    pub fn production() -> Self {
        RepositoryConfigBuilder::new()
            .flush_mode(FlushMode::Batched)
            .max_include_depth(8)
            .max_page_size(500)
    }

    /// Testing configuration
    pub fn testing() -> Self {
        RepositoryConfigBuilder::new()
            .flush_mode(FlushMode::Batched)
            .max_include_depth(4)
            .max_page_size(100)
    }
}
