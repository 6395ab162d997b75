//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to parse configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage not found: {storage}")]
    StorageNotFound { storage: String },

    #[error("Repository not found: {storage}:{repository}")]
    RepositoryNotFound { storage: String, repository: String },

    #[error("Invalid routing pattern '{pattern}' for group '{group}': {reason}")]
    InvalidPattern {
        group: String,
        pattern: String,
        reason: String,
    },

    #[error("{setting} must be strictly positive (got {value})")]
    NonPositiveSetting { setting: String, value: u64 },

    #[error("Cyclic group membership: {cycle}")]
    CyclicGroup { cycle: String },

    #[error("Group '{group}' references unknown member '{member}'")]
    UnknownMember { group: String, member: String },

    #[error("Proxy repository '{repository}' has no remote repository")]
    MissingRemote { repository: String },

    #[error("Repository '{repository}' is not a group but declares members")]
    UnexpectedMembers { repository: String },

    #[error("Invalid remote URL '{url}' for '{repository}': {reason}")]
    InvalidRemoteUrl {
        repository: String,
        url: String,
        reason: String,
    },

    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: String, id: String },

    #[error("Invalid configuration ({count} problems):\n{details}")]
    InvalidConfiguration { count: usize, details: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
