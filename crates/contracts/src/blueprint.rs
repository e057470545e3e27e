//! Blueprint - Config Loader output
//!
//! Describes the complete manifest: change source, sinks, transforms, routing channels.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::Channel;

/// Manifest version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ConfigVersion {
    #[default]
    V1,
}

impl TryFrom<u32> for ConfigVersion {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            // 0 means "unset" in older manifests
            0 | 1 => Ok(Self::V1),
            other => Err(format!("unsupported manifest version {other}, expected 1")),
        }
    }
}

impl From<ConfigVersion> for u32 {
    fn from(version: ConfigVersion) -> Self {
        match version {
            ConfigVersion::V1 => 1,
        }
    }
}

/// Complete manifest
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Blueprint {
    /// Manifest version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Change source
    #[validate(nested)]
    pub source: SourceConfig,

    /// Named sinks
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,

    /// Named transforms
    #[serde(default)]
    #[validate(nested)]
    pub transforms: Vec<TransformConfig>,

    /// Routing channels, in configuration order
    #[serde(default)]
    #[validate(nested)]
    pub channels: Vec<Channel>,

    /// Fan-out processor settings
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl Blueprint {
    /// Look up a sink definition by name
    pub fn sink(&self, name: &str) -> Option<&SinkConfig> {
        self.sinks.iter().find(|s| s.name == name)
    }

    /// Look up a transform definition by name
    pub fn transform(&self, name: &str) -> Option<&TransformConfig> {
        self.transforms.iter().find(|t| t.name == name)
    }
}

/// Change source configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Source connector type
    #[serde(default)]
    pub connector: SourceConnector,

    /// Connection string
    #[validate(length(min = 1, message = "dsn cannot be empty"))]
    pub dsn: String,

    /// Monitored tables (optionally schema-qualified)
    #[validate(length(min = 1, message = "at least one table must be monitored"))]
    pub tables: Vec<String>,

    /// Sleep between empty polls (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1, message = "poll_interval_ms must be > 0"))]
    pub poll_interval_ms: u64,

    /// Max events fetched per poll
    #[serde(default = "default_poll_limit")]
    #[validate(range(min = 1, message = "poll_limit must be > 0"))]
    pub poll_limit: u32,

    /// Timeout applied to every store statement (seconds)
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_poll_limit() -> u32 {
    50
}

fn default_statement_timeout_secs() -> u64 {
    30
}

/// Whether `name` is a plain or schema-qualified SQL identifier
///
/// Accepts `table` and `schema.table`, each part matching `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return false;
    }
    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

/// Source connector type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConnector {
    #[default]
    Postgres,
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name (referenced by channels)
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Worker queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be > 0"))]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON Lines file output
    File,
    /// HTTP POST output
    Webhook,
    /// Kafka topic output
    Kafka,
}

/// Transform configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransformConfig {
    /// Transform name (referenced by channels)
    #[validate(length(min = 1, message = "transform name cannot be empty"))]
    pub name: String,

    /// Transform type
    pub transform_type: TransformType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Built-in transform types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformType {
    /// Flatten nested row objects
    Flatten,
    /// Include / exclude / rename row fields
    ReplaceField,
    /// Mask sensitive row fields
    Mask,
}

/// Fan-out processor settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Sink receiving a dead letter for every failed channel attempt
    #[serde(default)]
    pub dead_letter_sink: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conversion() {
        assert_eq!(ConfigVersion::try_from(1), Ok(ConfigVersion::V1));
        assert_eq!(ConfigVersion::try_from(0), Ok(ConfigVersion::V1));
        assert!(ConfigVersion::try_from(2).is_err());
        assert_eq!(u32::from(ConfigVersion::V1), 1);
    }

    #[test]
    fn test_source_defaults() {
        let source: SourceConfig =
            serde_json::from_str(r#"{"dsn": "host=db", "tables": ["orders"]}"#).unwrap();
        assert_eq!(source.connector, SourceConnector::Postgres);
        assert_eq!(source.poll_interval(), Duration::from_secs(30));
        assert_eq!(source.poll_limit, 50);
        assert_eq!(source.statement_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_table_name_rules() {
        assert!(is_valid_table_name("orders"));
        assert!(is_valid_table_name("public.orders_2024"));
        assert!(is_valid_table_name("_tmp"));
        assert!(!is_valid_table_name("1orders"));
        assert!(!is_valid_table_name("orders; drop"));
        assert!(!is_valid_table_name("a.b.c"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("public."));
    }

    #[test]
    fn test_validate_catches_empty_fields() {
        let source: SourceConfig =
            serde_json::from_str(r#"{"dsn": "", "tables": [], "poll_limit": 0}"#).unwrap();
        let errors = source.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("dsn"));
        assert!(fields.contains_key("tables"));
        assert!(fields.contains_key("poll_limit"));
    }
}
