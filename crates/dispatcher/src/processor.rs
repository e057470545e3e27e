//! FanOutProcessor - concurrent per-channel delivery of one event
//!
//! Every channel of an event runs as its own task. `deliver` returns only after
//! all of them finished, which is the barrier the listener relies on before it
//! marks the event delivered. A failing channel never affects its siblings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use observability::{RunningStats, StatsSummary};
use serde::Serialize;
use tracing::{debug, error, warn, Instrument, Span};

use contracts::{CapturedEvent, Channel, ContractError, EventHandler, EventId, TransformRegistry};

use crate::registry::SinkRegistry;

/// Outcome of one channel delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: String,
    pub sink: String,
    /// `None` on success
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of delivering one event to all of its channels
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub event_id: EventId,
    /// In channel configuration order
    pub outcomes: Vec<ChannelOutcome>,
    pub elapsed: Duration,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Envelope handed to the dead-letter sink for every failed channel attempt
#[derive(Debug, Serialize)]
pub struct DeadLetter<'a> {
    pub channel: &'a str,
    pub sink: &'a str,
    pub error: &'a str,
    pub failed_at: DateTime<Utc>,
    pub event: &'a CapturedEvent,
}

/// Running totals
#[derive(Debug, Default)]
pub struct ProcessorStats {
    events: AtomicU64,
    channel_successes: AtomicU64,
    channel_failures: AtomicU64,
    dead_letters: AtomicU64,
    dead_letter_failures: AtomicU64,
    fanout_ms: Mutex<RunningStats>,
}

impl ProcessorStats {
    fn record_fanout(&self, elapsed: Duration) {
        self.fanout_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self) -> ProcessorStatsSnapshot {
        ProcessorStatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            channel_successes: self.channel_successes.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            dead_letter_failures: self.dead_letter_failures.load(Ordering::Relaxed),
            fanout_ms: self
                .fanout_ms
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .summary(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessorStatsSnapshot {
    pub events: u64,
    pub channel_successes: u64,
    pub channel_failures: u64,
    pub dead_letters: u64,
    pub dead_letter_failures: u64,
    /// Per-event fan-out latency (milliseconds)
    pub fanout_ms: StatsSummary,
}

/// Fans one event out to its channels
pub struct FanOutProcessor {
    sinks: Arc<SinkRegistry>,
    transforms: Arc<TransformRegistry>,
    dead_letter_sink: Option<String>,
    span: Span,
    stats: Arc<ProcessorStats>,
}

impl FanOutProcessor {
    pub fn new(sinks: SinkRegistry, transforms: TransformRegistry) -> Self {
        Self {
            sinks: Arc::new(sinks),
            transforms: Arc::new(transforms),
            dead_letter_sink: None,
            span: tracing::info_span!("fanout"),
            stats: Arc::default(),
        }
    }

    /// Forward a dead letter to `sink` for every failed channel attempt
    pub fn with_dead_letter_sink(mut self, sink: Option<String>) -> Self {
        self.dead_letter_sink = sink;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn stats(&self) -> ProcessorStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    /// Deliver `event` to every channel concurrently and wait for all of them
    pub async fn deliver(
        &self,
        event: Arc<CapturedEvent>,
        channels: &[Arc<Channel>],
    ) -> DeliveryReport {
        let span = self.span.clone();
        self.deliver_inner(event, channels).instrument(span).await
    }

    async fn deliver_inner(
        &self,
        event: Arc<CapturedEvent>,
        channels: &[Arc<Channel>],
    ) -> DeliveryReport {
        let started = Instant::now();

        let tasks: Vec<_> = channels
            .iter()
            .map(|channel| {
                let sinks = Arc::clone(&self.sinks);
                let transforms = Arc::clone(&self.transforms);
                let event = Arc::clone(&event);
                let task_channel = Arc::clone(channel);
                let handle = tokio::spawn(
                    async move { deliver_channel(&sinks, &transforms, event, &task_channel).await }
                        .in_current_span(),
                );
                (Arc::clone(channel), handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (channel, handle) in tasks {
            let result = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_error) => Err(format!("channel task panicked: {join_error}")),
            };
            outcomes.push(self.record_outcome(&event, &channel, result));
        }

        let report = DeliveryReport {
            event_id: event.id,
            outcomes,
            elapsed: started.elapsed(),
        };

        for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
            self.forward_dead_letter(&event, outcome).await;
        }

        self.stats.events.fetch_add(1, Ordering::Relaxed);
        self.stats.record_fanout(report.elapsed);
        observability::record_fanout_duration_ms(report.elapsed.as_secs_f64() * 1000.0);
        debug!(
            event_id = event.id,
            channels = report.outcomes.len(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Fan-out complete"
        );
        report
    }

    fn record_outcome(
        &self,
        event: &CapturedEvent,
        channel: &Channel,
        result: Result<(), String>,
    ) -> ChannelOutcome {
        let success = result.is_ok();
        observability::record_channel_delivery(&channel.key, &channel.sink, success);

        match &result {
            Ok(()) => {
                self.stats.channel_successes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.channel_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = event.id,
                    table = %event.table,
                    channel = %channel.key,
                    sink = %channel.sink,
                    error = %e,
                    "Channel delivery failed"
                );
            }
        }

        ChannelOutcome {
            channel: channel.key.clone(),
            sink: channel.sink.clone(),
            error: result.err(),
        }
    }

    async fn forward_dead_letter(&self, event: &CapturedEvent, outcome: &ChannelOutcome) {
        let Some(dlq) = self.dead_letter_sink.as_deref() else {
            return;
        };
        if outcome.sink == dlq {
            warn!(
                event_id = event.id,
                sink = dlq,
                "Dead-letter sink itself failed, not forwarding"
            );
            return;
        }
        let Some(handle) = self.sinks.get(dlq) else {
            warn!(sink = dlq, "Dead-letter sink is not registered");
            return;
        };

        let letter = DeadLetter {
            channel: &outcome.channel,
            sink: &outcome.sink,
            error: outcome.error.as_deref().unwrap_or_default(),
            failed_at: Utc::now(),
            event,
        };
        let result = match serde_json::to_vec(&letter) {
            Ok(payload) => handle
                .publish(Arc::new(event.clone()), Bytes::from(payload))
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => {
                self.stats.dead_letters.fetch_add(1, Ordering::Relaxed);
                observability::record_dead_letter(dlq);
            }
            Err(e) => {
                self.stats.dead_letter_failures.fetch_add(1, Ordering::Relaxed);
                error!(event_id = event.id, sink = dlq, error = %e, "Dead letter not delivered");
            }
        }
    }

    /// Drain every sink worker
    ///
    /// Returns the registry untouched if channel tasks still hold it.
    pub async fn shutdown(self) -> Result<(), Self> {
        match Arc::try_unwrap(self.sinks) {
            Ok(sinks) => {
                sinks.shutdown().await;
                Ok(())
            }
            Err(sinks) => Err(Self { sinks, ..self }),
        }
    }
}

impl std::fmt::Debug for FanOutProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutProcessor")
            .field("sinks", &self.sinks.names())
            .field("transforms", &self.transforms.names())
            .field("dead_letter_sink", &self.dead_letter_sink)
            .finish()
    }
}

/// Resolve, transform, publish
async fn deliver_channel(
    sinks: &SinkRegistry,
    transforms: &TransformRegistry,
    event: Arc<CapturedEvent>,
    channel: &Channel,
) -> Result<(), ContractError> {
    let handle = sinks.get(&channel.sink).ok_or_else(|| ContractError::UnknownSink {
        name: channel.sink.clone(),
    })?;

    let payload = build_payload(transforms, &event, channel)?;
    handle.publish(event, payload).await
}

/// Payload for one channel
///
/// A missing or unresolvable transform falls back to the canonical encoding.
fn build_payload(
    transforms: &TransformRegistry,
    event: &CapturedEvent,
    channel: &Channel,
) -> Result<Bytes, ContractError> {
    let Some(name) = channel.transform.as_deref() else {
        return event.to_canonical_json();
    };

    match transforms.resolve(name) {
        Ok(transform) => transform.map(event).map_err(|e| match e {
            ContractError::Transform { .. } => e,
            other => ContractError::transform(name, other.to_string()),
        }),
        Err(e) => {
            warn!(
                channel = %channel.key,
                transform = name,
                error = %e,
                "Transform not found, sending canonical event"
            );
            event.to_canonical_json()
        }
    }
}

impl EventHandler for FanOutProcessor {
    /// Never fails: channel failures are terminal for the attempt and only reported
    async fn handle(
        &self,
        event: Arc<CapturedEvent>,
        channels: &[Arc<Channel>],
    ) -> Result<(), ContractError> {
        self.deliver(event, channels).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::SinkHandle;
    use contracts::{DataSink, Operation, Transform};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tokio::time::sleep;

    type Received = Arc<Mutex<Vec<(EventId, Value)>>>;

    struct MemorySink {
        name: String,
        received: Received,
        fail: bool,
        delay: Duration,
        panic: bool,
    }

    impl MemorySink {
        fn new(name: &str) -> (Self, Received) {
            let received = Received::default();
            let sink = Self {
                name: name.to_string(),
                received: Arc::clone(&received),
                fail: false,
                delay: Duration::ZERO,
                panic: false,
            };
            (sink, received)
        }
    }

    impl DataSink for MemorySink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(
            &mut self,
            event: &CapturedEvent,
            payload: &[u8],
        ) -> Result<(), ContractError> {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.panic {
                panic!("sink blew up");
            }
            if self.fail {
                return Err(ContractError::sink_write(&self.name, "refused"));
            }
            let value: Value = serde_json::from_slice(payload)?;
            self.received.lock().unwrap().push((event.id, value));
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    struct Tag;

    impl Transform for Tag {
        fn name(&self) -> &str {
            "tag"
        }

        fn map(&self, event: &CapturedEvent) -> Result<Bytes, ContractError> {
            Ok(Bytes::from(json!({"tagged": event.id}).to_string()))
        }
    }

    fn event() -> Arc<CapturedEvent> {
        let row = json!({"id": 1}).as_object().cloned().unwrap();
        Arc::new(CapturedEvent::new(10, 5, Operation::Insert, "orders", row))
    }

    fn channel(key: &str, sink: &str) -> Arc<Channel> {
        Arc::new(Channel::new(key, "orders", sink))
    }

    fn registry(sinks: Vec<MemorySink>) -> SinkRegistry {
        let mut registry = SinkRegistry::new();
        for sink in sinks {
            registry.insert(SinkHandle::spawn(sink, 4)).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_failure_isolated_per_channel() {
        let (good, good_rx) = MemorySink::new("good");
        let (mut bad, _) = MemorySink::new("bad");
        bad.fail = true;

        let processor = FanOutProcessor::new(registry(vec![good, bad]), TransformRegistry::new());
        let report = processor
            .deliver(event(), &[channel("A", "bad"), channel("B", "good")])
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].channel, "A");
        assert!(!report.outcomes[0].is_success());
        assert!(report.outcomes[1].is_success());
        assert_eq!(good_rx.lock().unwrap().len(), 1);

        let stats = processor.stats();
        assert_eq!(stats.channel_successes, 1);
        assert_eq!(stats.channel_failures, 1);
        assert_eq!(stats.fanout_ms.count, 1);
    }

    #[tokio::test]
    async fn test_unknown_destination_is_channel_error() {
        let (good, good_rx) = MemorySink::new("good");
        let processor = FanOutProcessor::new(registry(vec![good]), TransformRegistry::new());

        let report = processor
            .deliver(event(), &[channel("A", "nowhere"), channel("B", "good")])
            .await;
        let error = report.outcomes[0].error.as_deref().unwrap();
        assert!(error.contains("unknown destination 'nowhere'"));
        assert_eq!(report.succeeded(), 1);
        assert_eq!(good_rx.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transform_and_fallback() {
        let (sink, received) = MemorySink::new("out");
        let mut transforms = TransformRegistry::new();
        transforms.register(Arc::new(Tag)).unwrap();
        let processor = FanOutProcessor::new(registry(vec![sink]), transforms);

        let tagged = Arc::new(Channel::new("A", "orders", "out").with_transform("tag"));
        let missing = Arc::new(Channel::new("B", "orders", "out").with_transform("missing"));
        let report = processor.deliver(event(), &[tagged, missing]).await;
        assert!(report.all_succeeded());

        let received = received.lock().unwrap();
        let payloads: Vec<&Value> = received.iter().map(|(_, v)| v).collect();
        assert!(payloads.contains(&&json!({"tagged": 10})));
        // unresolved transform: canonical encoding
        assert!(payloads
            .iter()
            .any(|v| v["table"] == "orders" && v["op"] == "insert" && v["id"] == 10));
    }

    #[tokio::test]
    async fn test_barrier_waits_for_slowest_channel() {
        let (mut slow, slow_rx) = MemorySink::new("slow");
        slow.delay = Duration::from_millis(100);
        let (fast, _) = MemorySink::new("fast");
        let processor = FanOutProcessor::new(registry(vec![slow, fast]), TransformRegistry::new());

        let report = processor
            .deliver(event(), &[channel("A", "slow"), channel("B", "fast")])
            .await;
        assert!(report.elapsed >= Duration::from_millis(100));
        assert_eq!(slow_rx.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_channels_run_concurrently() {
        let mut sinks = Vec::new();
        let mut channels = Vec::new();
        for i in 0..4 {
            let (mut sink, _) = MemorySink::new(&format!("s{i}"));
            sink.delay = Duration::from_millis(200);
            sinks.push(sink);
            channels.push(channel(&format!("C{i}"), &format!("s{i}")));
        }
        let processor = FanOutProcessor::new(registry(sinks), TransformRegistry::new());

        let report = processor.deliver(event(), &channels).await;
        assert!(report.all_succeeded());
        assert!(report.elapsed < Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_panicking_sink_recorded_as_failure() {
        let (mut boom, _) = MemorySink::new("boom");
        boom.panic = true;
        let (good, good_rx) = MemorySink::new("good");
        let processor = FanOutProcessor::new(registry(vec![boom, good]), TransformRegistry::new());

        let report = processor
            .deliver(event(), &[channel("A", "boom"), channel("B", "good")])
            .await;
        assert_eq!(report.failed(), 1);
        assert_eq!(good_rx.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_forwarded() {
        let (mut bad, _) = MemorySink::new("bad");
        bad.fail = true;
        let (dlq, dlq_rx) = MemorySink::new("dlq");
        let processor = FanOutProcessor::new(registry(vec![bad, dlq]), TransformRegistry::new())
            .with_dead_letter_sink(Some("dlq".to_string()));

        processor.deliver(event(), &[channel("A", "bad")]).await;

        let letters = dlq_rx.lock().unwrap();
        assert_eq!(letters.len(), 1);
        let letter = &letters[0].1;
        assert_eq!(letter["channel"], "A");
        assert_eq!(letter["sink"], "bad");
        assert!(letter["error"].as_str().unwrap().contains("refused"));
        assert_eq!(letter["event"]["id"], 10);
        assert_eq!(processor.stats().dead_letters, 1);
    }

    #[tokio::test]
    async fn test_failing_dead_letter_sink_is_counted_not_escalated() {
        let (mut bad, _) = MemorySink::new("bad");
        bad.fail = true;
        let (good, good_rx) = MemorySink::new("good");
        let (mut dlq, dlq_rx) = MemorySink::new("dlq");
        dlq.fail = true;
        let processor =
            FanOutProcessor::new(registry(vec![bad, good, dlq]), TransformRegistry::new())
                .with_dead_letter_sink(Some("dlq".to_string()));

        let report = processor
            .deliver(event(), &[channel("A", "bad"), channel("B", "good")])
            .await;
        assert_eq!(report.failed(), 1);
        assert_eq!(good_rx.lock().unwrap().len(), 1);
        assert!(dlq_rx.lock().unwrap().is_empty());

        let stats = processor.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.dead_letters, 0);
        assert_eq!(stats.dead_letter_failures, 1);

        // the next event is still delivered normally
        let report = processor.deliver(event(), &[channel("B", "good")]).await;
        assert!(report.all_succeeded());
        assert_eq!(good_rx.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dead_letter_sink_failure_not_forwarded_to_itself() {
        let (mut dlq, dlq_rx) = MemorySink::new("dlq");
        dlq.fail = true;
        let processor = FanOutProcessor::new(registry(vec![dlq]), TransformRegistry::new())
            .with_dead_letter_sink(Some("dlq".to_string()));

        let report = processor.deliver(event(), &[channel("A", "dlq")]).await;
        assert_eq!(report.failed(), 1);
        assert!(dlq_rx.lock().unwrap().is_empty());

        let stats = processor.stats();
        assert_eq!(stats.channel_failures, 1);
        assert_eq!(stats.dead_letters, 0);
        assert_eq!(stats.dead_letter_failures, 0);
        assert_eq!(processor.sinks().get("dlq").unwrap().metrics().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_handler_never_fails_and_shutdown_drains() {
        let (mut bad, _) = MemorySink::new("bad");
        bad.fail = true;
        let processor = FanOutProcessor::new(registry(vec![bad]), TransformRegistry::new());

        let result = processor.handle(event(), &[channel("A", "bad")]).await;
        assert!(result.is_ok());
        assert!(processor.shutdown().await.is_ok());
    }
}
