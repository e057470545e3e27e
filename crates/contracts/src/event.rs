//! CapturedEvent - one durably logged row-level change

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Store-assigned event identifier, strictly increasing per change log
pub type EventId = i64;

/// Row snapshot: column name -> value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Row-level operation captured by the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Single-letter code stored in the change log
    pub fn code(self) -> &'static str {
        match self {
            Self::Insert => "I",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }

    /// Parse the change log code (`I` / `U` / `D`)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "I" => Some(Self::Insert),
            "U" => Some(Self::Update),
            "D" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one change
///
/// Serializes to the canonical encoding `{id, ts, op, table, row}`; the delivered
/// flag is bookkeeping and never part of a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Monotonic identifier assigned at capture time
    pub id: EventId,

    /// Capture timestamp (unix epoch, milliseconds)
    #[serde(rename = "ts")]
    pub captured_at: i64,

    /// Operation tag
    pub op: Operation,

    /// Source table name
    pub table: String,

    /// Post-image for insert/update, pre-image for delete
    pub row: Row,

    /// Delivered flag
    #[serde(skip)]
    pub delivered: bool,
}

impl CapturedEvent {
    /// Create an undelivered event
    pub fn new(
        id: EventId,
        captured_at: i64,
        op: Operation,
        table: impl Into<String>,
        row: Row,
    ) -> Self {
        Self {
            id,
            captured_at,
            op,
            table: table.into(),
            row,
            delivered: false,
        }
    }

    /// Decode a row snapshot from its JSON text
    ///
    /// The snapshot must be a JSON object; anything else is a malformed row.
    pub fn decode_row(event_id: EventId, raw: &str) -> Result<Row, ContractError> {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(row)) => Ok(row),
            Ok(other) => Err(ContractError::malformed_row(
                event_id,
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
            Err(e) => Err(ContractError::malformed_row(event_id, e.to_string())),
        }
    }

    /// Canonical full-event serialization used when no transform applies
    pub fn to_canonical_json(&self) -> Result<Bytes, ContractError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> CapturedEvent {
        let row = json!({"id": 7, "total": 12.5, "customer": "acme"});
        CapturedEvent::new(
            42,
            1_700_000_000_000,
            Operation::Insert,
            "orders",
            row.as_object().unwrap().clone(),
        )
    }

    #[test]
    fn test_operation_codes() {
        assert_eq!(Operation::from_code("I"), Some(Operation::Insert));
        assert_eq!(Operation::from_code("U "), Some(Operation::Update));
        assert_eq!(Operation::from_code("D"), Some(Operation::Delete));
        assert_eq!(Operation::from_code("X"), None);
        assert_eq!(Operation::Delete.code(), "D");
    }

    #[test]
    fn test_canonical_encoding_fields() {
        let event = sample_event();
        let payload = event.to_canonical_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(value["id"], 42);
        assert_eq!(value["ts"], 1_700_000_000_000i64);
        assert_eq!(value["op"], "insert");
        assert_eq!(value["table"], "orders");
        assert_eq!(value["row"]["customer"], "acme");
        assert!(value.get("delivered").is_none());
    }

    #[test]
    fn test_decode_row_rejects_non_object() {
        let err = CapturedEvent::decode_row(3, "[1, 2]").unwrap_err();
        assert!(matches!(err, ContractError::MalformedRow { event_id: 3, .. }));

        let err = CapturedEvent::decode_row(4, "{not json").unwrap_err();
        assert!(err.is_fatal());

        let row = CapturedEvent::decode_row(5, r#"{"a": 1}"#).unwrap();
        assert_eq!(row["a"], 1);
    }
}
