//! EventHandler trait - listener delivery callback

use std::sync::Arc;

use crate::{CapturedEvent, Channel, ContractError};

/// Callback invoked by the listener once per routed event
///
/// The listener blocks on the returned future before touching the next event.
/// An `Err` is treated as fatal by the listener.
#[trait_variant::make(EventHandler: Send)]
pub trait LocalEventHandler {
    async fn handle(
        &self,
        event: Arc<CapturedEvent>,
        channels: &[Arc<Channel>],
    ) -> Result<(), ContractError>;
}
