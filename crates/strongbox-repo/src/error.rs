//! Error types for routing and resolution

use thiserror::Error;

use strongbox_core::CoreError;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error("Invalid routing pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{setting} must be strictly positive (got {value})")]
    InvalidSetting { setting: String, value: u64 },

    #[error("No provider registered for {repo_type} repositories")]
    ProviderNotRegistered { repo_type: String },

    #[error("Repository {repository} has no base directory")]
    MissingBasedir { repository: String },

    #[error("Proxy repository {repository} has no remote repository")]
    MissingRemote { repository: String },

    // ============ Request Errors ============
    #[error("Invalid artifact path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Deployment to {repository} rejected: {reason}")]
    DeploymentNotAllowed { repository: String, reason: String },

    #[error("{operation} is not supported by {repo_type} repository {repository}")]
    NotSupported {
        repository: String,
        repo_type: String,
        operation: String,
    },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Invalid remote URL: {url} - {reason}")]
    InvalidRemoteUrl { url: String, reason: String },

    // ============ Heartbeat Errors ============
    #[error("Heartbeat scheduler has been shut down")]
    SchedulerShutdown,

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Other ============
    #[error("{0}")]
    Other(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout { seconds: 30 }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRemoteUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for RepoError {
    fn from(e: tokio::task::JoinError) -> Self {
        RepoError::Other(format!("Background task failed: {}", e))
    }
}
