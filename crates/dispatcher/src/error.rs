//! Dispatcher error types

use thiserror::Error;

/// Errors raised while assembling the fan-out side
///
/// Delivery itself never returns these: per-channel failures are reported as
/// `ContractError`s inside a `DeliveryReport`.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Two sinks registered under one name
    #[error("sink '{name}' is already registered")]
    DuplicateSink { name: String },

    /// Contract error
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
