//! `validate` command implementation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use capture::normalize_table_name;
use contracts::Blueprint;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: u32,
    table_count: usize,
    sink_count: usize,
    transform_count: usize,
    channel_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_blueprint(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: blueprint.version.into(),
                    table_count: blueprint.source.tables.len(),
                    sink_count: blueprint.sinks.len(),
                    transform_count: blueprint.transforms.len(),
                    channel_count: blueprint.channels.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect non-fatal manifest issues
///
/// None of these stop the listener; they describe events that will be
/// consumed without reaching any sink, or channels that fail on every event.
pub(crate) fn collect_warnings(blueprint: &Blueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.channels.is_empty() {
        warnings.push(
            "No channels configured - every captured event will be marked delivered unrouted"
                .to_string(),
        );
    }

    let monitored: HashSet<&str> = blueprint
        .source
        .tables
        .iter()
        .map(|t| normalize_table_name(t))
        .collect();
    let routed: HashSet<&str> = blueprint
        .channels
        .iter()
        .map(|c| normalize_table_name(&c.table))
        .collect();

    for table in &blueprint.source.tables {
        if !routed.contains(normalize_table_name(table)) {
            warnings.push(format!(
                "Table '{table}' is monitored but has no channels - its events will be dropped"
            ));
        }
    }

    for channel in &blueprint.channels {
        if !monitored.contains(normalize_table_name(&channel.table)) {
            warnings.push(format!(
                "Channel '{}' routes table '{}' which is not monitored - it will never fire",
                channel.key, channel.table
            ));
        }
        if blueprint.sink(&channel.sink).is_none() {
            warnings.push(format!(
                "Channel '{}' references undefined sink '{}' - every delivery will fail",
                channel.key, channel.sink
            ));
        }
        if let Some(transform) = &channel.transform {
            if blueprint.transform(transform).is_none() {
                warnings.push(format!(
                    "Channel '{}' references undefined transform '{transform}' - \
                     the canonical event JSON will be sent instead",
                    channel.key
                ));
            }
        }
    }

    let dead_letter = blueprint.processor.dead_letter_sink.as_deref();
    for sink in &blueprint.sinks {
        let used = blueprint.channels.iter().any(|c| c.sink == sink.name);
        if !used && dead_letter != Some(sink.name.as_str()) {
            warnings.push(format!("Sink '{}' is not used by any channel", sink.name));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Tables: {}", summary.table_count);
            println!("  Sinks: {}", summary.sink_count);
            println!("  Transforms: {}", summary.transform_count);
            println!("  Channels: {}", summary.channel_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};
    use std::path::PathBuf;

    const MANIFEST: &str = r#"
[source]
dsn = "host=localhost user=postgres"
tables = ["public.orders", "payments"]

[[sinks]]
name = "ledger"
sink_type = "log"

[[sinks]]
name = "spare"
sink_type = "log"

[[channels]]
key = "orders-ledger"
table = "orders"
sink = "ledger"
transform = "missing"

[[channels]]
key = "refunds-ledger"
table = "refunds"
sink = "nowhere"
"#;

    #[test]
    fn test_collect_warnings() {
        let blueprint = ConfigLoader::load_from_str(MANIFEST, ConfigFormat::Toml).unwrap();
        let warnings = collect_warnings(&blueprint);

        let has = |needle: &str| warnings.iter().any(|w| w.contains(needle));
        assert!(has("Table 'payments' is monitored but has no channels"));
        assert!(!has("Table 'public.orders'"));
        assert!(has("Channel 'refunds-ledger' routes table 'refunds'"));
        assert!(has("undefined sink 'nowhere'"));
        assert!(has("undefined transform 'missing'"));
        assert!(has("Sink 'spare' is not used"));
        assert!(!has("Sink 'ledger'"));
        assert_eq!(warnings.len(), 5);
    }

    #[test]
    fn test_sample_manifest_is_clean() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/tablecast.toml");
        let blueprint = load_blueprint(&path).unwrap();
        assert!(collect_warnings(&blueprint).is_empty());
        assert_eq!(blueprint.processor.dead_letter_sink.as_deref(), Some("dead-letters"));
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let args = ValidateArgs {
            config: PathBuf::from("/definitely/not/here.toml"),
            json: true,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[test]
    fn test_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tablecast.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let result = validate_config(&ValidateArgs {
            config: path,
            json: false,
        });
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.channel_count, 2);
        assert_eq!(summary.table_count, 2);
    }
}
