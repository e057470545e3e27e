//! DataSink trait - Sink capability
//!
//! Defines the abstract interface for destinations.

use crate::{CapturedEvent, ContractError};

/// Destination capability
///
/// All sink implementations must implement this trait. A sink may retry
/// internally, but `publish` must return a terminal result: the fan-out
/// processor performs no retries of its own.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Hand off one payload for one event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn publish(&mut self, event: &CapturedEvent, payload: &[u8])
        -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
