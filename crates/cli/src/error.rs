//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Manifest file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Manifest failed to parse or validate
    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: ContractError,
    },

    /// Source database unreachable
    #[error("Failed to connect to the source database: {source}")]
    StoreConnection {
        #[source]
        source: ContractError,
    },

    /// Event table, function or trigger installation failed
    #[error("Failed to install change capture: {message}")]
    Install { message: String },

    /// Sinks or transforms could not be built
    #[error("Failed to build pipeline: {message}")]
    PipelineBuild { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_load(path: impl Into<String>, source: ContractError) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            source,
        }
    }

    pub fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
        }
    }

    pub fn pipeline_build(message: impl Into<String>) -> Self {
        Self::PipelineBuild {
            message: message.into(),
        }
    }
}
