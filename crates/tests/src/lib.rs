//! # Integration Tests
//!
//! End-to-end tests across crates, no database required: the in-memory change
//! store stands in for Postgres, real sink workers and transforms do the rest.

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use capture::{Installer, Listener, MemoryStore, RoutingTable};
    use contracts::{
        CapturedEvent, Channel, ContractError, DataSink, EventId, Operation, TransformRegistry,
    };
    use dispatcher::{FanOutProcessor, SinkHandle, SinkRegistry};
    use serde_json::{json, Value};

    /// Ordered record of sink activity shared by every test sink
    pub type Journal = Arc<Mutex<Vec<String>>>;

    /// Sink that records what it receives, optionally slow or failing
    pub struct RecordingSink {
        name: String,
        journal: Journal,
        received: Arc<Mutex<Vec<(EventId, Value)>>>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingSink {
        pub fn new(name: &str, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                journal: Arc::clone(journal),
                received: Arc::default(),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub fn received(&self) -> Arc<Mutex<Vec<(EventId, Value)>>> {
            Arc::clone(&self.received)
        }
    }

    impl DataSink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(
            &mut self,
            event: &CapturedEvent,
            payload: &[u8],
        ) -> Result<(), ContractError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:start:{}", self.name, event.id));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:end:{}", self.name, event.id));
            if self.fail {
                return Err(ContractError::sink_write(&self.name, "connection refused"));
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

    pub fn journal_index(journal: &Journal, entry: &str) -> usize {
        journal
            .lock()
            .unwrap()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("journal has no '{entry}'"))
    }

    pub fn registry(sinks: Vec<RecordingSink>) -> SinkRegistry {
        let mut registry = SinkRegistry::new();
        for sink in sinks {
            registry.insert(SinkHandle::spawn(sink, 8)).unwrap();
        }
        registry
    }

    pub fn row(value: Value) -> contracts::Row {
        value.as_object().cloned().unwrap()
    }

    /// Store with triggers installed on `tables`
    pub async fn installed_store(tables: &[&str]) -> MemoryStore {
        let mut store = MemoryStore::new();
        let tables: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        Installer::new(tables).install(&mut store).await.unwrap();
        store
    }

    pub fn listener(
        store: &MemoryStore,
        channels: &[Channel],
        sinks: SinkRegistry,
        transforms: TransformRegistry,
    ) -> Listener<MemoryStore, FanOutProcessor> {
        Listener::new(
            store.clone(),
            RoutingTable::from_channels(channels),
            FanOutProcessor::new(sinks, transforms),
        )
    }

    pub fn order(id: i64) -> (Operation, contracts::Row) {
        (Operation::Insert, row(json!({ "id": id, "total": 10 * id })))
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use capture::{Installer, MemoryStore};
    use contracts::{Channel, Operation, TransformRegistry};
    use serde_json::json;

    use crate::support::*;

    /// Events on tables without channels are consumed, not retried
    #[tokio::test]
    async fn test_unrouted_event_is_terminal() {
        let journal = Journal::default();
        let store = installed_store(&["orders", "notes"]).await;
        let id = store
            .record_change("notes", Operation::Update, row(json!({"id": 1})))
            .unwrap();

        let mut listener = listener(
            &store,
            &[Channel::new("orders-ledger", "orders", "ledger")],
            registry(vec![RecordingSink::new("ledger", &journal)]),
            TransformRegistry::new(),
        );

        let outcome = listener.poll_once(10).await.unwrap();
        assert_eq!((outcome.fetched, outcome.routed, outcome.unrouted), (1, 0, 1));
        assert!(store.is_delivered(id));
        assert!(journal.lock().unwrap().is_empty());

        let outcome = listener.poll_once(10).await.unwrap();
        assert_eq!(outcome.fetched, 0);
    }

    /// One failing channel neither blocks its siblings nor the delivered mark
    #[tokio::test]
    async fn test_channel_failure_is_isolated() {
        let journal = Journal::default();
        let store = installed_store(&["orders"]).await;
        let (op, data) = order(1);
        let id = store.record_change("orders", op, data).unwrap();

        let ledger = RecordingSink::new("ledger", &journal);
        let ledger_rx = ledger.received();
        let dlq = RecordingSink::new("dlq", &journal);
        let dlq_rx = dlq.received();
        let broken = RecordingSink::new("broken", &journal).failing();

        let channels = [
            Channel::new("orders-broken", "orders", "broken"),
            Channel::new("orders-ledger", "orders", "ledger"),
        ];
        let mut listener = capture::Listener::new(
            store.clone(),
            capture::RoutingTable::from_channels(&channels),
            dispatcher::FanOutProcessor::new(
                registry(vec![ledger, broken, dlq]),
                TransformRegistry::new(),
            )
            .with_dead_letter_sink(Some("dlq".to_string())),
        );

        listener.poll_once(10).await.unwrap();

        assert!(store.is_delivered(id));
        let ledger_rx = ledger_rx.lock().unwrap();
        assert_eq!(ledger_rx.len(), 1);
        assert_eq!(ledger_rx[0].1["row"]["total"], 10);

        let dlq_rx = dlq_rx.lock().unwrap();
        assert_eq!(dlq_rx.len(), 1);
        assert_eq!(dlq_rx[0].1["channel"], "orders-broken");
        assert_eq!(dlq_rx[0].1["sink"], "broken");
        assert!(dlq_rx[0].1["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(dlq_rx[0].1["event"]["id"], id);

        let (_, processor, _) = listener.into_parts();
        let stats = processor.stats();
        assert_eq!(stats.channel_successes, 1);
        assert_eq!(stats.channel_failures, 1);
        assert_eq!(stats.dead_letters, 1);
    }

    /// A lost delivered mark means the event comes round again
    #[tokio::test]
    async fn test_failed_mark_redelivers_event() {
        let journal = Journal::default();
        let store = installed_store(&["orders"]).await;
        let (op, data) = order(1);
        let id = store.record_change("orders", op, data).unwrap();

        let ledger = RecordingSink::new("ledger", &journal);
        let received = ledger.received();
        let mut listener = listener(
            &store,
            &[Channel::new("orders-ledger", "orders", "ledger")],
            registry(vec![ledger]),
            TransformRegistry::new(),
        );

        store.fail_next_mark("connection reset");
        assert!(listener.poll_once(10).await.is_err());
        assert!(!store.is_delivered(id));

        listener.poll_once(10).await.unwrap();
        assert!(store.is_delivered(id));

        let ids: Vec<_> = received.lock().unwrap().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![id, id]);
    }

    /// Event N+1 reaches no sink before every channel of event N has finished
    #[tokio::test]
    async fn test_fan_out_is_a_barrier_between_events() {
        let journal = Journal::default();
        let store = installed_store(&["orders"]).await;
        for n in 1..=2 {
            let (op, data) = order(n);
            store.record_change("orders", op, data).unwrap();
        }

        let mut listener = listener(
            &store,
            &[
                Channel::new("orders-slow", "orders", "slow"),
                Channel::new("orders-fast", "orders", "fast"),
            ],
            registry(vec![
                RecordingSink::new("slow", &journal).slow(Duration::from_millis(80)),
                RecordingSink::new("fast", &journal),
            ]),
            TransformRegistry::new(),
        );

        let outcome = listener.poll_once(10).await.unwrap();
        assert_eq!(outcome.routed, 2);

        // concurrent within one event
        assert!(journal_index(&journal, "fast:end:1") < journal_index(&journal, "slow:end:1"));
        // ordered across events
        assert!(journal_index(&journal, "slow:end:1") < journal_index(&journal, "fast:start:2"));
    }

    /// Re-running the installer keeps one trigger per table
    #[tokio::test]
    async fn test_install_is_idempotent() {
        let store = installed_store(&["public.orders"]).await;
        let mut again = store.clone();
        Installer::new(vec!["orders".to_string()])
            .install(&mut again)
            .await
            .unwrap();

        assert_eq!(store.install_count(), 2);
        assert_eq!(store.installed_tables(), vec!["orders"]);

        let (op, data) = order(1);
        store.record_change("orders", op, data).unwrap();
        assert_eq!(store.event_count(), 1);
    }

    /// Changes before install are not captured
    #[tokio::test]
    async fn test_nothing_captured_before_install() {
        let store = MemoryStore::new();
        let (op, data) = order(1);
        assert!(store.record_change("orders", op, data).is_none());
        assert_eq!(store.event_count(), 0);
    }

    /// A channel naming a missing transform still delivers the canonical event
    #[tokio::test]
    async fn test_unknown_transform_falls_back_to_canonical_json() {
        let journal = Journal::default();
        let store = installed_store(&["orders"]).await;
        let (op, data) = order(3);
        let id = store.record_change("orders", op, data).unwrap();

        let ledger = RecordingSink::new("ledger", &journal);
        let received = ledger.received();
        let mut listener = listener(
            &store,
            &[Channel::new("orders-ledger", "orders", "ledger").with_transform("nope")],
            registry(vec![ledger]),
            TransformRegistry::new(),
        );

        listener.poll_once(10).await.unwrap();

        let received = received.lock().unwrap();
        let payload = &received[0].1;
        assert_eq!(payload["id"], id);
        assert_eq!(payload["op"], "insert");
        assert_eq!(payload["table"], "orders");
        assert_eq!(payload["row"], json!({"id": 3, "total": 30}));
        assert!(payload["ts"].is_i64());
    }
}

#[cfg(test)]
mod manifest_tests {
    use std::path::Path;

    use capture::{Installer, Listener, MemoryStore, RoutingTable};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::Operation;
    use dispatcher::FanOutProcessor;
    use serde_json::{json, Value};

    use crate::support::row;

    fn manifest(audit: &Path, masked: &Path) -> String {
        format!(
            r#"
[source]
dsn = "host=localhost user=postgres"
tables = ["public.orders", "customers"]
poll_interval_ms = 50
poll_limit = 10

[[sinks]]
name = "ledger"
sink_type = "log"

[[sinks]]
name = "audit"
sink_type = "file"
params = {{ path = "{audit}" }}

[[sinks]]
name = "masked"
sink_type = "file"
params = {{ path = "{masked}" }}

[[transforms]]
name = "flat"
transform_type = "flatten"

[[transforms]]
name = "hide-email"
transform_type = "mask"
params = {{ fields = "email", strategy = "redact" }}

[[channels]]
key = "orders-ledger"
table = "orders"
sink = "ledger"

[[channels]]
key = "orders-audit"
table = "orders"
sink = "audit"
transform = "flat"

[[channels]]
key = "customers-masked"
table = "customers"
sink = "masked"
transform = "hide-email"
"#,
            audit = audit.display(),
            masked = masked.display()
        )
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    /// Manifest to files: routing, transforms and real sink workers together
    #[tokio::test]
    async fn test_manifest_drives_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let audit = dir.path().join("audit.jsonl");
        let masked = dir.path().join("customers.jsonl");
        let blueprint =
            ConfigLoader::load_from_str(&manifest(&audit, &masked), ConfigFormat::Toml).unwrap();

        let mut store = MemoryStore::new();
        Installer::new(blueprint.source.tables.clone())
            .install(&mut store)
            .await
            .unwrap();
        store
            .record_change(
                "orders",
                Operation::Insert,
                row(json!({"id": 1, "shipping": {"city": "Oslo"}})),
            )
            .unwrap();
        store
            .record_change(
                "customers",
                Operation::Update,
                row(json!({"id": 9, "email": "ada@example.com"})),
            )
            .unwrap();
        store
            .record_change("orders", Operation::Delete, row(json!({"id": 1})))
            .unwrap();

        let sinks = dispatcher::build_sink_registry(&blueprint.sinks).unwrap();
        let transforms = transforms::build_registry(&blueprint.transforms).unwrap();
        let processor = FanOutProcessor::new(sinks, transforms);
        let mut listener = Listener::new(
            store.clone(),
            RoutingTable::from_channels(&blueprint.channels),
            processor,
        );

        let outcome = listener
            .poll_once(blueprint.source.poll_limit as usize)
            .await
            .unwrap();
        assert_eq!(outcome.fetched, 3);
        assert_eq!(outcome.routed, 3);
        assert_eq!(store.undelivered_count(), 0);

        let (_, processor, stats) = listener.into_parts();
        assert_eq!(stats.events_delivered, 3);
        assert_eq!(processor.stats().channel_successes, 5);
        assert!(processor.shutdown().await.is_ok());

        let audit_lines = read_lines(&audit);
        assert_eq!(audit_lines.len(), 2);
        assert_eq!(audit_lines[0]["shipping.city"], "Oslo");
        assert_eq!(audit_lines[0]["_op"], "insert");
        assert_eq!(audit_lines[1]["_op"], "delete");

        let masked_lines = read_lines(&masked);
        assert_eq!(masked_lines.len(), 1);
        assert_ne!(masked_lines[0]["row"]["email"], "ada@example.com");
        assert_eq!(masked_lines[0]["row"]["id"], 9);
    }

    /// A manifest written back out loads to the same routing
    #[test]
    fn test_manifest_survives_reserialization() {
        let dir = tempfile::tempdir().unwrap();
        let original = ConfigLoader::load_from_str(
            &manifest(&dir.path().join("a.jsonl"), &dir.path().join("b.jsonl")),
            ConfigFormat::Toml,
        )
        .unwrap();

        let path = dir.path().join("tablecast.json");
        std::fs::write(&path, ConfigLoader::to_json(&original).unwrap()).unwrap();
        let reloaded = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(reloaded.channels, original.channels);
        assert_eq!(reloaded.source.tables, original.source.tables);
        assert_eq!(reloaded.transforms.len(), 2);
    }
}
