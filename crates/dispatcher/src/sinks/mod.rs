//! Sink implementations
//!
//! Contains LogSink, FileSink, WebhookSink and, with the `kafka` feature, KafkaSink.

mod file;
mod kafka;
mod log;
mod webhook;

pub use self::file::{FileSink, FileSinkConfig, Rotation};
#[cfg(feature = "kafka")]
pub use self::kafka::KafkaSink;
pub use self::kafka::KafkaSinkConfig;
pub use self::log::LogSink;
pub use self::webhook::{WebhookSink, WebhookSinkConfig};
