//! Layered error definitions
//!
//! Categorized by source: config / store / transform / sink

use thiserror::Error;

use crate::EventId;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Change Store Errors =====
    /// Store unreachable or a query failed
    #[error("change store error during {operation}: {message}")]
    Store { operation: String, message: String },

    /// Schema / trigger installation failed (rolled back)
    #[error("provisioning error: {message}")]
    Provisioning { message: String },

    /// Captured row snapshot could not be decoded
    #[error("malformed captured row for event {event_id}: {message}")]
    MalformedRow { event_id: EventId, message: String },

    // ===== Transform Errors =====
    /// Transform name does not resolve
    #[error("unknown transform '{name}'")]
    UnknownTransform { name: String },

    /// Transform execution failed
    #[error("transform '{name}' failed: {message}")]
    Transform { name: String, message: String },

    // ===== Sink Errors =====
    /// Sink name does not resolve
    #[error("unknown destination '{name}'")]
    UnknownSink { name: String },

    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create change store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create provisioning error
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
        }
    }

    /// Create malformed row error
    pub fn malformed_row(event_id: EventId, message: impl Into<String>) -> Self {
        Self::MalformedRow {
            event_id,
            message: message.into(),
        }
    }

    /// Create transform execution error
    pub fn transform(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the error must stop the capture loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::Provisioning { .. } | Self::MalformedRow { .. }
        )
    }
}
