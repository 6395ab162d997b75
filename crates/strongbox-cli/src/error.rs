//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use thiserror::Error;

use strongbox_core::CoreError;
use strongbox_repo::RepoError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration missing, unreadable or invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(strongbox::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Nothing serves the requested path
    #[error("{message}")]
    #[diagnostic(code(strongbox::cli::not_found))]
    NotFound { message: String },

    /// Invalid user input (path, pattern, repository reference)
    #[error("Invalid input: {message}")]
    #[diagnostic(code(strongbox::cli::input))]
    Input { message: String },

    /// Remote repository unreachable
    #[error("Network error: {message}")]
    #[diagnostic(code(strongbox::cli::network))]
    Network { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(strongbox::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(strongbox::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Network { .. } => exit_codes::NETWORK_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConfigNotFound { .. } => CliError::config_with_help(
                err.to_string(),
                "Pass --config <FILE> or set STRONGBOX_CONFIG",
            ),
            CoreError::StorageNotFound { .. } | CoreError::RepositoryNotFound { .. } => {
                CliError::Input {
                    message: err.to_string(),
                }
            }
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Config(core) => core.into(),
            RepoError::InvalidPath { .. } | RepoError::InvalidPattern { .. } => CliError::Input {
                message: err.to_string(),
            },
            RepoError::InvalidSetting { .. } => CliError::config(err.to_string()),
            RepoError::HttpError { .. }
            | RepoError::NetworkError { .. }
            | RepoError::Timeout { .. }
            | RepoError::InvalidRemoteUrl { .. } => CliError::Network {
                message: err.to_string(),
            },
            RepoError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let missing = CliError::from(CoreError::ConfigNotFound {
            path: "/nope.yaml".to_string(),
        });
        assert_eq!(missing.exit_code(), exit_codes::CONFIG_ERROR);

        let cycle = CliError::from(RepoError::Config(CoreError::CyclicGroup {
            cycle: "s:a -> s:a".to_string(),
        }));
        assert_eq!(cycle.exit_code(), exit_codes::CONFIG_ERROR);

        let path = CliError::from(RepoError::InvalidPath {
            path: "../x".to_string(),
            reason: "parent".to_string(),
        });
        assert_eq!(path.exit_code(), exit_codes::USAGE_ERROR);

        assert_eq!(CliError::not_found("nope").exit_code(), exit_codes::NOT_FOUND);
    }
}
