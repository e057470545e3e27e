//! Channel - a configured routing rule

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Routing rule: source table -> destination sink, optional transform
///
/// Sinks and transforms are referenced by name and resolved at delivery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Channel {
    /// Stable identifying key (unique across the manifest)
    #[validate(length(min = 1, message = "channel key cannot be empty"))]
    pub key: String,

    /// Source table name
    #[validate(length(min = 1, message = "channel table cannot be empty"))]
    pub table: String,

    /// Destination sink name
    #[validate(length(min = 1, message = "channel sink cannot be empty"))]
    pub sink: String,

    /// Optional transform name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl Channel {
    pub fn new(key: impl Into<String>, table: impl Into<String>, sink: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            table: table.into(),
            sink: sink.into(),
            transform: None,
        }
    }

    /// Attach a transform by name
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }
}
