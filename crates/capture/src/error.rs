//! Capture error types

use contracts::{ContractError, EventId};
use thiserror::Error;

/// Capture errors
///
/// Every variant is fatal to the listener loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Store, provisioning or decode failure
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// The delivery callback reported an error
    #[error("event handler failed for event {event_id}: {source}")]
    Handler {
        /// Event being delivered
        event_id: EventId,
        /// Handler error
        #[source]
        source: ContractError,
    },
}

impl CaptureError {
    /// Whether installation of the schema / triggers failed
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Contract(ContractError::Provisioning { .. }))
    }
}

/// Capture Result type alias
pub type Result<T> = std::result::Result<T, CaptureError>;
