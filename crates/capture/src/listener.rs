//! Listener - sequential poll-and-mark loop
//!
//! Per event, strictly in fetch order:
//! 1. look up the channels routed for its table
//! 2. no channels: log and treat as handled; otherwise await the handler
//! 3. mark the event delivered
//!
//! The mark happens only after step 2 completes, so a crash in between leaves
//! the event undelivered and it is fetched again on restart.

use std::sync::Arc;
use std::time::Duration;

use contracts::{ChangeStore, EventHandler};
use tracing::{debug, error, info, Instrument, Span};

use crate::{CaptureError, Result, RoutingTable};

/// Result of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Events returned by the store
    pub fetched: usize,
    /// Events handed to the handler
    pub routed: usize,
    /// Events with no matching channel
    pub unrouted: usize,
}

/// Running totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub polls: u64,
    pub events_fetched: u64,
    pub events_routed: u64,
    pub events_unrouted: u64,
    pub events_delivered: u64,
}

/// Change log listener
///
/// Owns the store exclusively; a single listener per change log.
pub struct Listener<S, H> {
    store: S,
    routing: RoutingTable,
    handler: H,
    span: Span,
    stats: ListenerStats,
}

impl<S, H> Listener<S, H>
where
    S: ChangeStore,
    H: EventHandler,
{
    pub fn new(store: S, routing: RoutingTable, handler: H) -> Self {
        Self {
            store,
            routing,
            handler,
            span: tracing::info_span!("listener"),
            stats: ListenerStats::default(),
        }
    }

    /// Use `span` as the parent of every log line the listener emits
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn into_parts(self) -> (S, H, ListenerStats) {
        (self.store, self.handler, self.stats)
    }

    /// Fetch one batch and deliver it event by event
    ///
    /// # Errors
    /// Any store failure, a malformed row, or a handler error. Events already
    /// marked stay marked; the failing event and everything after it stay
    /// undelivered.
    pub async fn poll_once(&mut self, batch_limit: usize) -> Result<PollOutcome> {
        let span = self.span.clone();
        self.poll_batch(batch_limit).instrument(span).await
    }

    async fn poll_batch(&mut self, batch_limit: usize) -> Result<PollOutcome> {
        let batch = self.store.fetch_undelivered(batch_limit).await?;
        let mut outcome = PollOutcome {
            fetched: batch.len(),
            ..Default::default()
        };

        self.stats.polls += 1;
        self.stats.events_fetched += batch.len() as u64;
        observability::record_poll(batch.len());
        if !batch.is_empty() {
            debug!(fetched = batch.len(), "Fetched undelivered events");
        }

        for event in batch {
            let event = Arc::new(event);
            let event_id = event.id;
            let channels = self.routing.channels_for(&event.table);

            if channels.is_empty() {
                info!(
                    event_id,
                    table = %event.table,
                    op = %event.op,
                    "No channel for table, nothing to deliver"
                );
                outcome.unrouted += 1;
                self.stats.events_unrouted += 1;
                observability::record_event_unrouted(&event.table);
            } else {
                self.handler
                    .handle(Arc::clone(&event), channels)
                    .await
                    .map_err(|source| CaptureError::Handler { event_id, source })?;
                outcome.routed += 1;
                self.stats.events_routed += 1;
            }

            self.store.mark_delivered(event_id).await?;
            self.stats.events_delivered += 1;
            observability::record_event_delivered();
        }

        Ok(outcome)
    }

    /// Poll forever
    ///
    /// Sleeps `poll_interval` only after a short batch; a full batch is
    /// followed immediately by the next poll. Returns only on a fatal error.
    pub async fn run(&mut self, poll_interval: Duration, batch_limit: usize) -> Result<()> {
        let batch_limit = batch_limit.max(1);
        self.span.in_scope(|| {
            info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                batch_limit,
                tables = ?self.routing.tables(),
                "Listener started"
            );
        });

        loop {
            let outcome = match self.poll_once(batch_limit).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.span.in_scope(|| error!(error = %e, "Listener stopped"));
                    return Err(e);
                }
            };

            if outcome.fetched < batch_limit {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

impl<S, H> std::fmt::Debug for Listener<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("routing", &self.routing)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
