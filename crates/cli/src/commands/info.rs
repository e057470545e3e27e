//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::Blueprint;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Manifest info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: u32,
    source: SourceInfo,
    sinks: Vec<SinkInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    transforms: Vec<TransformInfo>,
    routes: Vec<RouteInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dead_letter_sink: Option<String>,
}

#[derive(Serialize)]
struct SourceInfo {
    connector: String,
    tables: Vec<String>,
    poll_interval_ms: u64,
    poll_limit: u32,
    statement_timeout_secs: u64,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

#[derive(Serialize)]
struct TransformInfo {
    name: String,
    transform_type: String,
}

#[derive(Serialize)]
struct RouteInfo {
    table: String,
    channels: Vec<ChannelInfo>,
}

#[derive(Serialize)]
struct ChannelInfo {
    key: String,
    sink: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transform: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;
    let config_info = build_config_info(&blueprint);

    if args.json {
        let json =
            serde_json::to_string_pretty(&config_info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config_info);
    }

    Ok(())
}

fn build_config_info(blueprint: &Blueprint) -> ConfigInfo {
    // DSNs routinely carry credentials
    let source = SourceInfo {
        connector: label(&blueprint.source.connector),
        tables: blueprint.source.tables.clone(),
        poll_interval_ms: blueprint.source.poll_interval_ms,
        poll_limit: blueprint.source.poll_limit,
        statement_timeout_secs: blueprint.source.statement_timeout_secs,
    };

    let sinks = blueprint
        .sinks
        .iter()
        .map(|s| SinkInfo {
            name: s.name.clone(),
            sink_type: label(&s.sink_type),
            queue_capacity: s.queue_capacity,
        })
        .collect();

    let transforms = blueprint
        .transforms
        .iter()
        .map(|t| TransformInfo {
            name: t.name.clone(),
            transform_type: label(&t.transform_type),
        })
        .collect();

    let routing = capture::RoutingTable::from_channels(&blueprint.channels);
    let routes = routing
        .tables()
        .into_iter()
        .map(|table| RouteInfo {
            table: table.to_string(),
            channels: routing
                .channels_for(table)
                .iter()
                .map(|c| ChannelInfo {
                    key: c.key.clone(),
                    sink: c.sink.clone(),
                    transform: c.transform.clone(),
                })
                .collect(),
        })
        .collect();

    ConfigInfo {
        version: blueprint.version.into(),
        source,
        sinks,
        transforms,
        routes,
        dead_letter_sink: blueprint.processor.dead_letter_sink.clone(),
    }
}

/// Manifest spelling of a config enum
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn print_config_info(info: &ConfigInfo) {
    println!("tablecast configuration (version {})\n", info.version);

    println!("Source ({})", info.source.connector);
    println!("   ├─ Tables: {}", info.source.tables.join(", "));
    println!("   ├─ Poll interval: {} ms", info.source.poll_interval_ms);
    println!("   ├─ Poll limit: {}", info.source.poll_limit);
    println!(
        "   └─ Statement timeout: {} s",
        info.source.statement_timeout_secs
    );

    println!("\nSinks ({})", info.sinks.len());
    for (i, sink) in info.sinks.iter().enumerate() {
        let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} {} ({}, queue {})",
            prefix, sink.name, sink.sink_type, sink.queue_capacity
        );
    }

    if !info.transforms.is_empty() {
        println!("\nTransforms ({})", info.transforms.len());
        for (i, transform) in info.transforms.iter().enumerate() {
            let prefix = if i == info.transforms.len() - 1 { "└─" } else { "├─" };
            println!("   {} {} ({})", prefix, transform.name, transform.transform_type);
        }
    }

    println!("\nRoutes ({} tables)", info.routes.len());
    for (i, route) in info.routes.iter().enumerate() {
        let is_last = i == info.routes.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        println!("   {} {}", prefix, route.table);
        for (j, channel) in route.channels.iter().enumerate() {
            let channel_prefix = if j == route.channels.len() - 1 { "└─" } else { "├─" };
            match &channel.transform {
                Some(t) => println!(
                    "   {}  {} {} -> {} via {}",
                    child_prefix, channel_prefix, channel.key, channel.sink, t
                ),
                None => println!(
                    "   {}  {} {} -> {}",
                    child_prefix, channel_prefix, channel.key, channel.sink
                ),
            }
        }
    }

    if let Some(ref dlq) = info.dead_letter_sink {
        println!("\nDead-letter sink: {}", dlq);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    #[test]
    fn test_config_info_groups_routes_and_hides_dsn() {
        let manifest = r#"{
            "source": { "dsn": "postgres://user:secret@db/app", "tables": ["orders"] },
            "sinks": [
                { "name": "ledger", "sink_type": "log" },
                { "name": "dlq", "sink_type": "log" }
            ],
            "transforms": [{ "name": "flat", "transform_type": "flatten" }],
            "channels": [
                { "key": "a", "table": "orders", "sink": "ledger", "transform": "flat" },
                { "key": "b", "table": "public.orders", "sink": "ledger" }
            ],
            "processor": { "dead_letter_sink": "dlq" }
        }"#;
        let blueprint = ConfigLoader::load_from_str(manifest, ConfigFormat::Json).unwrap();
        let info = build_config_info(&blueprint);

        assert_eq!(info.routes.len(), 1);
        assert_eq!(info.routes[0].table, "orders");
        assert_eq!(info.routes[0].channels.len(), 2);
        assert_eq!(info.dead_letter_sink.as_deref(), Some("dlq"));

        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"transform_type\":\"flatten\""));
        assert_eq!(label(&contracts::TransformType::ReplaceField), "replace_field");
    }
}
