//! In-memory change store
//!
//! Behaves like the PostgreSQL change log (ordering, delivered flag, idempotent
//! install, raw snapshot decoding) without a database. Clones share state, so a
//! test can keep one handle while the listener owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use contracts::{CapturedEvent, ChangeStore, ContractError, EventId, Operation, Row};
use tracing::warn;

use crate::routing::normalize_table_name;
use crate::schema;

#[derive(Debug, Clone)]
struct StoredEvent {
    id: EventId,
    ts: i64,
    op: Operation,
    table: String,
    raw_row: String,
    delivered: bool,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: EventId,
    events: Vec<StoredEvent>,
    installed: Vec<String>,
    install_count: usize,
    fail_install: Option<String>,
    fail_fetch: Option<String>,
    fail_mark: Option<String>,
}

/// Shared in-memory change log
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a row change on `table`, stamped with the current time
    ///
    /// Returns `None` when no trigger is installed for the table.
    pub fn record_change(&self, table: &str, op: Operation, row: Row) -> Option<EventId> {
        self.record_change_at(table, op, row, now_millis())
    }

    /// Simulate a row change with an explicit capture timestamp
    pub fn record_change_at(
        &self,
        table: &str,
        op: Operation,
        row: Row,
        ts: i64,
    ) -> Option<EventId> {
        let raw = serde_json::Value::Object(row).to_string();
        self.push(table, op, raw, ts)
    }

    /// Append a change whose snapshot text is stored verbatim
    ///
    /// Bypasses the trigger check; used to plant undecodable rows.
    pub fn insert_raw(&self, table: &str, op: Operation, raw_row: impl Into<String>) -> EventId {
        let mut inner = self.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.events.push(StoredEvent {
            id,
            ts: now_millis(),
            op,
            table: normalize_table_name(table).to_string(),
            raw_row: raw_row.into(),
            delivered: false,
        });
        id
    }

    fn push(&self, table: &str, op: Operation, raw_row: String, ts: i64) -> Option<EventId> {
        let table = normalize_table_name(table);
        let mut inner = self.lock();
        if !inner.installed.iter().any(|t| t == table) {
            return None;
        }
        inner.last_id += 1;
        let id = inner.last_id;
        inner.events.push(StoredEvent {
            id,
            ts,
            op,
            table: table.to_string(),
            raw_row,
            delivered: false,
        });
        Some(id)
    }

    /// Make the next `install` fail without touching state
    pub fn fail_next_install(&self, message: impl Into<String>) {
        self.lock().fail_install = Some(message.into());
    }

    /// Make the next `fetch_undelivered` fail
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        self.lock().fail_fetch = Some(message.into());
    }

    /// Make the next `mark_delivered` fail
    pub fn fail_next_mark(&self, message: impl Into<String>) {
        self.lock().fail_mark = Some(message.into());
    }

    pub fn install_count(&self) -> usize {
        self.lock().install_count
    }

    /// Tables with an installed trigger, in install order
    pub fn installed_tables(&self) -> Vec<String> {
        self.lock().installed.clone()
    }

    pub fn is_delivered(&self, id: EventId) -> bool {
        self.lock()
            .events
            .iter()
            .any(|e| e.id == id && e.delivered)
    }

    pub fn undelivered_count(&self) -> usize {
        self.lock().events.iter().filter(|e| !e.delivered).count()
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }
}

impl ChangeStore for MemoryStore {
    async fn install(&mut self, tables: &[String]) -> Result<(), ContractError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_install.take() {
            return Err(ContractError::provisioning(message));
        }
        // same identifier rules as the SQL script
        schema::install_statements(tables)?;

        inner.install_count += 1;
        for table in tables {
            let table = normalize_table_name(table).to_string();
            if !inner.installed.contains(&table) {
                inner.installed.push(table);
            }
        }
        Ok(())
    }

    async fn fetch_undelivered(
        &mut self,
        limit: usize,
    ) -> Result<Vec<CapturedEvent>, ContractError> {
        let pending = {
            let mut guard = self.lock();
            if let Some(message) = guard.fail_fetch.take() {
                return Err(ContractError::store("fetch", message));
            }
            let mut pending: Vec<StoredEvent> =
                guard.events.iter().filter(|e| !e.delivered).cloned().collect();
            pending.sort_by_key(|e| (e.ts, e.id));
            pending.truncate(limit);
            pending
        };

        pending
            .into_iter()
            .map(|stored| {
                let row = CapturedEvent::decode_row(stored.id, &stored.raw_row)?;
                Ok(CapturedEvent::new(
                    stored.id,
                    stored.ts,
                    stored.op,
                    stored.table,
                    row,
                ))
            })
            .collect()
    }

    async fn mark_delivered(&mut self, id: EventId) -> Result<(), ContractError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_mark.take() {
            return Err(ContractError::store("mark_delivered", message));
        }
        match inner.events.iter_mut().find(|e| e.id == id) {
            Some(event) => event.delivered = true,
            None => warn!(event_id = id, "mark_delivered matched no event"),
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
