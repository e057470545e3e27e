//! SinkRegistry - sink name -> running sink worker

use std::collections::HashMap;

use tracing::{info, instrument};

use contracts::{SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, WebhookSink};

/// Running sinks, keyed by configured name
#[derive(Debug, Default)]
pub struct SinkRegistry {
    handles: HashMap<String, SinkHandle>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running sink under its own name
    pub fn insert(&mut self, handle: SinkHandle) -> Result<(), DispatcherError> {
        let name = handle.name().to_string();
        if self.handles.contains_key(&name) {
            return Err(DispatcherError::DuplicateSink { name });
        }
        self.handles.insert(name, handle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SinkHandle> {
        self.handles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Per-sink metrics, sorted by name
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        let mut metrics: Vec<(String, MetricsSnapshot)> = self
            .handles
            .iter()
            .map(|(name, h)| (name.clone(), h.metrics().snapshot()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    /// Drain every worker, flushing and closing its sink
    #[instrument(name = "sink_registry_shutdown", skip(self), fields(sinks = self.handles.len()))]
    pub async fn shutdown(self) {
        for (_, handle) in self.handles {
            handle.shutdown().await;
        }
        info!("All sinks shut down");
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Webhook => {
            let sink = WebhookSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Kafka => create_kafka_handle(config),
    }
}

#[cfg(feature = "kafka")]
fn create_kafka_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let sink = crate::sinks::KafkaSink::from_params(&config.name, &config.params)
        .map_err(|e| DispatcherError::sink_creation(&config.name, e))?;
    Ok(SinkHandle::spawn(sink, config.queue_capacity))
}

#[cfg(not(feature = "kafka"))]
fn create_kafka_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    // params are checked even without the producer
    crate::sinks::KafkaSinkConfig::from_params(&config.params)
        .map_err(|e| DispatcherError::sink_creation(&config.name, e))?;
    Err(DispatcherError::sink_creation(
        &config.name,
        "kafka sinks need a build with the `kafka` feature",
    ))
}

/// Spawn a worker for every configured sink
///
/// Must run inside a tokio runtime.
#[instrument(name = "dispatcher_build_sinks", skip(configs), fields(sink_count = configs.len()))]
pub fn build_sink_registry(configs: &[SinkConfig]) -> Result<SinkRegistry, DispatcherError> {
    let mut registry = SinkRegistry::new();
    for config in configs {
        registry.insert(create_sink_handle(config)?)?;
    }
    info!(sinks = ?registry.names(), "Sinks started");
    Ok(registry)
}
