//! Pipeline orchestrator - wires store, routing, processor and listener.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use capture::{Installer, Listener, PostgresStore, RoutingTable};
use contracts::{Blueprint, ChangeStore, SourceConfig};
use dispatcher::FanOutProcessor;
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Attempts at reclaiming the sinks from channel tasks cut off by shutdown
const DRAIN_ATTEMPTS: u32 = 100;
const DRAIN_BACKOFF: Duration = Duration::from_millis(50);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The loaded manifest, CLI overrides applied
    pub blueprint: Blueprint,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Connect to the source database and run until `shutdown` resolves
    ///
    /// Returns an error if setup fails or the listener hits a fatal error.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let store = connect_store(&self.config.blueprint.source).await?;
        self.run_with_store(store, shutdown).await
    }

    /// Run against an already connected store
    pub async fn run_with_store<S, F>(self, mut store: S, shutdown: F) -> Result<PipelineStats>
    where
        S: ChangeStore,
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = self.config.blueprint;
        let source = &blueprint.source;

        install_capture(&mut store, &source.tables).await?;

        let sinks = dispatcher::build_sink_registry(&blueprint.sinks)
            .map_err(|e| CliError::pipeline_build(e.to_string()))?;
        let transforms = match transforms::build_registry(&blueprint.transforms) {
            Ok(transforms) => transforms,
            Err(e) => {
                sinks.shutdown().await;
                return Err(CliError::pipeline_build(e.to_string()).into());
            }
        };
        let active_sinks = sinks.len();
        let processor = FanOutProcessor::new(sinks, transforms)
            .with_dead_letter_sink(blueprint.processor.dead_letter_sink.clone());

        let routing = RoutingTable::from_channels(&blueprint.channels);
        info!(
            tables = ?routing.tables(),
            channels = routing.channel_count(),
            sinks = active_sinks,
            "Routing table built"
        );

        let mut listener = Listener::new(store, routing, processor);
        let poll_interval = source.poll_interval();
        let poll_limit = source.poll_limit as usize;

        let outcome = tokio::select! {
            result = listener.run(poll_interval, poll_limit) => Some(result),
            _ = shutdown => {
                warn!("Received shutdown signal, stopping listener...");
                None
            }
        };

        let (_store, processor, listener_stats) = listener.into_parts();
        let processor_stats = processor.stats();
        let sink_metrics = processor.sinks().metrics();
        drain(processor).await;

        let stats = PipelineStats {
            duration: start_time.elapsed(),
            active_sinks,
            listener: listener_stats,
            processor: processor_stats,
            sinks: sink_metrics,
        };

        match outcome {
            Some(Err(e)) => Err(e).context("Listener stopped on a fatal error"),
            // run only returns on error
            Some(Ok(())) | None => Ok(stats),
        }
    }
}

/// Open a Postgres connection for `source`
pub async fn connect_store(source: &SourceConfig) -> Result<PostgresStore, CliError> {
    info!(
        tables = ?source.tables,
        statement_timeout_secs = source.statement_timeout_secs,
        "Connecting to source database..."
    );
    let store = PostgresStore::connect(&source.dsn, source.statement_timeout())
        .await
        .map_err(|source| CliError::StoreConnection { source })?;
    info!("Connected to source database");
    Ok(store)
}

/// Install the event table, capture function and one trigger per table
pub async fn install_capture<S: ChangeStore>(
    store: &mut S,
    tables: &[String],
) -> Result<(), CliError> {
    Installer::new(tables.to_vec())
        .install(store)
        .await
        .map_err(|e| CliError::install(e.to_string()))
}

/// Flush and close every sink
///
/// A shutdown that cuts a fan-out short leaves its channel tasks running
/// until their sink replies; wait for them to let go of the registry.
async fn drain(mut processor: FanOutProcessor) {
    for _ in 0..DRAIN_ATTEMPTS {
        match processor.shutdown().await {
            Ok(()) => return,
            Err(still_shared) => {
                processor = still_shared;
                tokio::time::sleep(DRAIN_BACKOFF).await;
            }
        }
    }
    warn!("Channel tasks still running, sinks not drained");
}
