//! Manifest validation
//!
//! Rules:
//! - field-level constraints declared on the contract types (`validator` derive)
//! - monitored tables are valid identifiers, no duplicates
//! - sink / transform names and channel keys are unique
//! - per-type required params are present
//! - dead-letter sink, when set, exists
//!
//! Channels naming an undefined sink or transform are NOT rejected: they are
//! resolved at delivery time and fail per channel.

use std::collections::HashSet;

use contracts::{is_valid_table_name, Blueprint, ContractError, SinkType, TransformType};
use validator::Validate;

/// Validate a Blueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &Blueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_tables(blueprint)?;
    validate_sinks(blueprint)?;
    validate_transforms(blueprint)?;
    validate_channels(blueprint)?;
    validate_processor(blueprint)?;
    Ok(())
}

fn validate_fields(blueprint: &Blueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("manifest", e.to_string()))
}

fn validate_tables(blueprint: &Blueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, table) in blueprint.source.tables.iter().enumerate() {
        if !is_valid_table_name(table) {
            return Err(ContractError::config_validation(
                format!("source.tables[{idx}]"),
                format!("'{table}' is not a valid table identifier"),
            ));
        }
        if !seen.insert(table) {
            return Err(ContractError::config_validation(
                format!("source.tables[{idx}]"),
                format!("duplicate table '{table}'"),
            ));
        }
    }
    Ok(())
}

fn validate_sinks(blueprint: &Blueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for sink in &blueprint.sinks {
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }

        let required: &[&str] = match sink.sink_type {
            SinkType::Log => &[],
            SinkType::File => &["path"],
            SinkType::Webhook => &["url"],
            SinkType::Kafka => &["bootstrap_servers", "topic"],
        };
        for param in required {
            if sink.params.get(*param).is_none_or(|v| v.trim().is_empty()) {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.{param}", sink.name),
                    format!("required for sink_type {:?}", sink.sink_type),
                ));
            }
        }

        if sink.sink_type == SinkType::Kafka {
            for param in ["partitions", "replication_factor"] {
                let Some(raw) = sink.params.get(param) else {
                    continue;
                };
                if !raw.trim().parse::<i32>().is_ok_and(|n| n > 0) {
                    return Err(ContractError::config_validation(
                        format!("sinks[{}].params.{param}", sink.name),
                        format!("must be a positive integer, got '{raw}'"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_transforms(blueprint: &Blueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for transform in &blueprint.transforms {
        if !seen.insert(&transform.name) {
            return Err(ContractError::config_validation(
                format!("transforms[name={}]", transform.name),
                "duplicate transform name",
            ));
        }

        let has = |key: &str| {
            transform
                .params
                .get(key)
                .is_some_and(|v| !v.trim().is_empty())
        };
        match transform.transform_type {
            TransformType::Flatten => {}
            TransformType::ReplaceField => {
                if !has("include") && !has("exclude") && !has("rename") {
                    return Err(ContractError::config_validation(
                        format!("transforms[{}].params", transform.name),
                        "replace_field needs at least one of include / exclude / rename",
                    ));
                }
            }
            TransformType::Mask => {
                if !has("fields") {
                    return Err(ContractError::config_validation(
                        format!("transforms[{}].params.fields", transform.name),
                        "required for transform_type Mask",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_channels(blueprint: &Blueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, channel) in blueprint.channels.iter().enumerate() {
        if !seen.insert(&channel.key) {
            return Err(ContractError::config_validation(
                format!("channels[key={}]", channel.key),
                "duplicate channel key",
            ));
        }
        if !is_valid_table_name(&channel.table) {
            return Err(ContractError::config_validation(
                format!("channels[{idx}].table"),
                format!("'{}' is not a valid table identifier", channel.table),
            ));
        }
    }
    Ok(())
}

fn validate_processor(blueprint: &Blueprint) -> Result<(), ContractError> {
    if let Some(ref dlq) = blueprint.processor.dead_letter_sink {
        if blueprint.sink(dlq).is_none() {
            return Err(ContractError::config_validation(
                "processor.dead_letter_sink",
                format!("sink '{dlq}' is not defined"),
            ));
        }
    }
    Ok(())
}
