//! PostgreSQL change store

use std::time::Duration;

use contracts::{CapturedEvent, ChangeStore, ContractError, EventId, Operation};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, warn};

use crate::schema;

/// Change log living in the monitored PostgreSQL database
///
/// Owns a single connection; the listener is its only user.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect, verify the session and apply the statement timeout
    ///
    /// # Errors
    /// `Store` when the database is unreachable or rejects the session setup
    pub async fn connect(dsn: &str, statement_timeout: Duration) -> Result<Self, ContractError> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls)
            .await
            .map_err(|e| ContractError::store("connect", e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection terminated");
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| ContractError::store("ping", e.to_string()))?;

        let timeout_ms = statement_timeout.as_millis();
        client
            .batch_execute(&format!("SET statement_timeout = {timeout_ms}"))
            .await
            .map_err(|e| ContractError::store("set statement_timeout", e.to_string()))?;

        info!(timeout_ms = timeout_ms as u64, "Connected to change store");
        Ok(Self { client })
    }

    /// Wrap an already-connected client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl ChangeStore for PostgresStore {
    async fn install(&mut self, tables: &[String]) -> Result<(), ContractError> {
        let statements = schema::install_statements(tables)?;

        let tx = self
            .client
            .transaction()
            .await
            .map_err(|e| ContractError::provisioning(format!("begin: {e}")))?;

        // an early return drops `tx`, which rolls back
        for statement in &statements {
            tx.batch_execute(statement)
                .await
                .map_err(|e| ContractError::provisioning(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| ContractError::provisioning(format!("commit: {e}")))?;

        debug!(statements = statements.len(), "Install transaction committed");
        Ok(())
    }

    async fn fetch_undelivered(
        &mut self,
        limit: usize,
    ) -> Result<Vec<CapturedEvent>, ContractError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(schema::FETCH_UNDELIVERED, &[&limit])
            .await
            .map_err(|e| ContractError::store("fetch", e.to_string()))?;

        rows.iter().map(decode_event).collect()
    }

    async fn mark_delivered(&mut self, id: EventId) -> Result<(), ContractError> {
        let updated = self
            .client
            .execute(schema::MARK_DELIVERED, &[&id])
            .await
            .map_err(|e| ContractError::store("mark_delivered", e.to_string()))?;

        if updated == 0 {
            warn!(event_id = id, "mark_delivered matched no event");
        }
        Ok(())
    }
}

fn decode_event(row: &Row) -> Result<CapturedEvent, ContractError> {
    let id: EventId = row
        .try_get(0)
        .map_err(|e| ContractError::store("fetch", format!("id column: {e}")))?;

    let op_code: String = row
        .try_get(1)
        .map_err(|e| ContractError::malformed_row(id, format!("op column: {e}")))?;
    let op = Operation::from_code(&op_code)
        .ok_or_else(|| ContractError::malformed_row(id, format!("unknown op code '{op_code}'")))?;

    let table: String = row
        .try_get(2)
        .map_err(|e| ContractError::malformed_row(id, format!("table column: {e}")))?;
    let raw_row: String = row
        .try_get(3)
        .map_err(|e| ContractError::malformed_row(id, format!("row column: {e}")))?;
    let ts: i64 = row
        .try_get(4)
        .map_err(|e| ContractError::malformed_row(id, format!("ts column: {e}")))?;

    let snapshot = CapturedEvent::decode_row(id, &raw_row)?;
    Ok(CapturedEvent::new(id, ts, op, table, snapshot))
}
