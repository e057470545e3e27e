//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::Blueprint;
use tracing::{error, info, warn};

use super::{load_blueprint, validate::collect_warnings};
use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;
    apply_overrides(&mut blueprint, args);

    info!(
        tables = ?blueprint.source.tables,
        sinks = blueprint.sinks.len(),
        transforms = blueprint.transforms.len(),
        channels = blueprint.channels.len(),
        poll_interval_ms = blueprint.source.poll_interval_ms,
        poll_limit = blueprint.source.poll_limit,
        "Configuration loaded"
    );
    for warning in collect_warnings(&blueprint) {
        warn!("{}", warning);
    }

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        events_delivered = stats.listener.events_delivered,
        channel_failures = stats.processor.channel_failures,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline stopped"
    );
    stats.print_summary();

    info!("tablecast finished");
    Ok(())
}

/// Apply command-line overrides on top of the manifest
fn apply_overrides(blueprint: &mut Blueprint, args: &RunArgs) {
    if let Some(ref dsn) = args.dsn {
        info!("Overriding source DSN from CLI");
        blueprint.source.dsn = dsn.clone();
    }
    if let Some(interval) = args.poll_interval_ms {
        info!(poll_interval_ms = interval, "Overriding poll interval from CLI");
        blueprint.source.poll_interval_ms = interval.max(1);
    }
    if let Some(limit) = args.poll_limit {
        info!(poll_limit = limit, "Overriding poll limit from CLI");
        blueprint.source.poll_limit = limit.max(1);
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &Blueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Source:");
    println!("  Tables: {}", blueprint.source.tables.join(", "));
    println!("  Poll interval: {} ms", blueprint.source.poll_interval_ms);
    println!("  Poll limit: {}", blueprint.source.poll_limit);

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!("\nChannels ({}):", blueprint.channels.len());
    for channel in &blueprint.channels {
        match &channel.transform {
            Some(t) => println!(
                "  - {}: {} -> {} via {}",
                channel.key, channel.table, channel.sink, t
            ),
            None => println!("  - {}: {} -> {}", channel.key, channel.table, channel.sink),
        }
    }

    if let Some(ref dlq) = blueprint.processor.dead_letter_sink {
        println!("\nDead-letter sink: {}", dlq);
    }

    println!();
}
