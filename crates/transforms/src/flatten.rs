//! Flatten nested row objects

use std::collections::HashMap;

use bytes::Bytes;
use contracts::{CapturedEvent, ContractError, Row, Transform};
use serde_json::Value;

use crate::invalid_param;

/// Emits the row as a flat object: `{"a": {"b": 1}}` becomes `{"a.b": 1}`
#[derive(Debug, Clone)]
pub struct Flatten {
    name: String,
    delimiter: String,
    /// 0 = unlimited
    max_depth: usize,
    include_metadata: bool,
}

impl Flatten {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delimiter: ".".to_string(),
            max_depth: 0,
            include_metadata: true,
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub(crate) fn from_params(
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let mut flatten = Self::new(name);
        if let Some(delimiter) = params.get("delimiter") {
            if delimiter.is_empty() {
                return Err(invalid_param(name, "delimiter", "cannot be empty"));
            }
            flatten = flatten.delimiter(delimiter.clone());
        }
        if let Some(depth) = params.get("max_depth") {
            let depth = depth.trim().parse().map_err(|_| {
                invalid_param(name, "max_depth", format!("'{depth}' is not a number"))
            })?;
            flatten = flatten.max_depth(depth);
        }
        if let Some(include) = params.get("include_metadata") {
            flatten = flatten.include_metadata(!include.trim().eq_ignore_ascii_case("false"));
        }
        Ok(flatten)
    }

    fn flatten_row(&self, row: &Row) -> Result<Row, ContractError> {
        let mut result = Row::new();
        self.flatten_recursive(row, "", &mut result, 0)?;
        Ok(result)
    }

    /// Empty nested objects are kept as `{}`; two paths producing the same
    /// flattened key are an error.
    fn flatten_recursive(
        &self,
        obj: &Row,
        prefix: &str,
        result: &mut Row,
        depth: usize,
    ) -> Result<(), ContractError> {
        for (key, value) in obj {
            let new_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}{}{key}", self.delimiter)
            };

            match value.as_object() {
                Some(nested)
                    if !nested.is_empty()
                        && (self.max_depth == 0 || depth < self.max_depth) =>
                {
                    self.flatten_recursive(nested, &new_key, result, depth + 1)?;
                }
                _ => self.insert_unique(result, new_key, value.clone())?,
            }
        }
        Ok(())
    }

    fn insert_unique(
        &self,
        result: &mut Row,
        key: String,
        value: Value,
    ) -> Result<(), ContractError> {
        if result.contains_key(&key) {
            return Err(ContractError::transform(
                &self.name,
                format!("flattened key '{key}' produced more than once"),
            ));
        }
        result.insert(key, value);
        Ok(())
    }
}

impl Transform for Flatten {
    fn name(&self) -> &str {
        &self.name
    }

    fn map(&self, event: &CapturedEvent) -> Result<Bytes, ContractError> {
        let mut flat = self.flatten_row(&event.row)?;
        if self.include_metadata {
            self.insert_unique(&mut flat, "_op".to_string(), Value::from(event.op.as_str()))?;
            self.insert_unique(&mut flat, "_table".to_string(), Value::from(event.table.as_str()))?;
            self.insert_unique(&mut flat, "_id".to_string(), Value::from(event.id))?;
        }
        Ok(Bytes::from(serde_json::to_vec(&flat)?))
    }
}
