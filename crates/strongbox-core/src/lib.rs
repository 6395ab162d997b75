//! Strongbox Core - configuration model for the artifact repository manager
//!
//! This crate provides the foundational types used throughout Strongbox:
//! - `Configuration`: storages, repositories and routing rules as loaded from YAML
//! - `Repository`: hosted, proxy and group repositories with their policy flags
//! - `RoutingRulesConfig`: accept/deny rule sets keyed by group repository
//! - `ConfigurationManager`: validated, atomically reloadable snapshot

pub mod config;
pub mod error;
pub mod manager;

pub use config::{
    Configuration, RemoteRepositoriesConfiguration, RemoteRepository, Repository, RepositoryKey,
    RepositoryStatus, RepositoryType, RoutingRuleConfig, RoutingRulesConfig, RuleSetConfig,
    Storage, WILDCARD_GROUP,
};
pub use error::{CoreError, Result};
pub use manager::ConfigurationManager;
