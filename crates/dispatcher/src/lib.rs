//! # Dispatcher
//!
//! Fan-out side of the pipeline.
//!
//! Responsibilities:
//! - Run every configured sink behind an isolated worker (`SinkHandle`)
//! - Deliver one event to all of its channels concurrently (`FanOutProcessor`)
//! - Keep channel failures isolated and report them per channel

pub mod error;
pub mod handle;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod sinks;

pub use contracts::DataSink;
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use processor::{
    ChannelOutcome, DeadLetter, DeliveryReport, FanOutProcessor, ProcessorStats,
    ProcessorStatsSnapshot,
};
pub use registry::{build_sink_registry, create_sink_handle, SinkRegistry};
#[cfg(feature = "kafka")]
pub use sinks::KafkaSink;
pub use sinks::{FileSink, KafkaSinkConfig, LogSink, WebhookSink};
