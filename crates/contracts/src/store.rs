//! ChangeStore trait - source store boundary
//!
//! The capture listener is the single, sequential owner of a store.

use crate::{CapturedEvent, ContractError, EventId};

/// Durable change log inside the source store
#[trait_variant::make(ChangeStore: Send)]
pub trait LocalChangeStore {
    /// Provision the change log, the capture procedure and one trigger per table
    ///
    /// Runs in a single transaction and is idempotent.
    async fn install(&mut self, tables: &[String]) -> Result<(), ContractError>;

    /// Fetch up to `limit` undelivered events, oldest first
    ///
    /// # Errors
    /// `Store` when the query fails, `MalformedRow` when a snapshot cannot be decoded
    async fn fetch_undelivered(&mut self, limit: usize)
        -> Result<Vec<CapturedEvent>, ContractError>;

    /// Set the delivered flag of one event
    async fn mark_delivered(&mut self, id: EventId) -> Result<(), ContractError>;
}
