//! Mask sensitive row fields

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use contracts::{CapturedEvent, ContractError, Row, Transform};
use serde_json::Value;

use crate::{envelope, invalid_param, list_param};

/// Masking strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MaskStrategy {
    /// Asterisks, one per character (capped at 20)
    #[default]
    Asterisks,
    /// Fixed replacement text
    Fixed(String),
    /// JSON null
    Null,
    /// Field removed
    Redact,
}

impl MaskStrategy {
    /// Parse `asterisks`, `fixed:<text>`, `null` or `redact`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(text) = raw.strip_prefix("fixed:") {
            return Some(Self::Fixed(text.to_string()));
        }
        match raw.to_ascii_lowercase().as_str() {
            "asterisks" => Some(Self::Asterisks),
            "null" => Some(Self::Null),
            "redact" => Some(Self::Redact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mask {
    name: String,
    fields: HashSet<String>,
    strategy: MaskStrategy,
}

impl Mask {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            strategy: MaskStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: MaskStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub(crate) fn from_params(
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let fields = list_param(params, "fields");
        if fields.is_empty() {
            return Err(invalid_param(name, "fields", "at least one field is required"));
        }
        let strategy = match params.get("strategy") {
            Some(raw) => MaskStrategy::parse(raw).ok_or_else(|| {
                invalid_param(name, "strategy", format!("unknown mask strategy '{raw}'"))
            })?,
            None => MaskStrategy::default(),
        };
        Ok(Self::new(name, fields).with_strategy(strategy))
    }

    fn mask_value(&self, value: &Value) -> Value {
        match &self.strategy {
            MaskStrategy::Asterisks => match value.as_str() {
                Some(s) => Value::String("*".repeat(s.chars().count().min(20))),
                None => Value::String("****".to_string()),
            },
            MaskStrategy::Fixed(text) => Value::String(text.clone()),
            MaskStrategy::Null | MaskStrategy::Redact => Value::Null,
        }
    }

    fn mask_row(&self, mut row: Row) -> Row {
        for field in &self.fields {
            if self.strategy == MaskStrategy::Redact {
                row.remove(field);
            } else if let Some(value) = row.get_mut(field) {
                *value = self.mask_value(value);
            }
        }
        row
    }
}

impl Transform for Mask {
    fn name(&self) -> &str {
        &self.name
    }

    fn map(&self, event: &CapturedEvent) -> Result<Bytes, ContractError> {
        envelope(event, self.mask_row(event.row.clone()))
    }
}
