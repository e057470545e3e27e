//! # Transforms
//!
//! Built-in payload transforms, configured by name in the manifest.
//!
//! | type            | output                                                    |
//! |-----------------|-----------------------------------------------------------|
//! | `flatten`       | flat row object, nested keys joined with a delimiter      |
//! | `replace_field` | canonical envelope, row filtered and renamed              |
//! | `mask`          | canonical envelope, selected row fields masked            |

mod flatten;
mod mask;
mod replace_field;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    CapturedEvent, ContractError, Row, Transform, TransformConfig, TransformRegistry, TransformType,
};
use tracing::debug;

pub use flatten::Flatten;
pub use mask::{Mask, MaskStrategy};
pub use replace_field::ReplaceField;

/// Build one transform from its manifest entry
///
/// # Errors
/// `ConfigValidation` for malformed parameters
pub fn create_transform(config: &TransformConfig) -> Result<Arc<dyn Transform>, ContractError> {
    let transform: Arc<dyn Transform> = match config.transform_type {
        TransformType::Flatten => Arc::new(Flatten::from_params(&config.name, &config.params)?),
        TransformType::ReplaceField => {
            Arc::new(ReplaceField::from_params(&config.name, &config.params)?)
        }
        TransformType::Mask => Arc::new(Mask::from_params(&config.name, &config.params)?),
    };
    debug!(name = %config.name, kind = ?config.transform_type, "Transform created");
    Ok(transform)
}

/// Build the registry for every configured transform
pub fn build_registry(configs: &[TransformConfig]) -> Result<TransformRegistry, ContractError> {
    let mut registry = TransformRegistry::new();
    for config in configs {
        registry.register(create_transform(config)?)?;
    }
    Ok(registry)
}

/// Comma-separated list parameter, blanks dropped
pub(crate) fn list_param(params: &HashMap<String, String>, key: &str) -> Vec<String> {
    params
        .get(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn invalid_param(
    transform: &str,
    key: &str,
    message: impl Into<String>,
) -> ContractError {
    ContractError::config_validation(format!("transforms[{transform}].params.{key}"), message)
}

/// Canonical event encoding with a replaced row
pub(crate) fn envelope(event: &CapturedEvent, row: Row) -> Result<Bytes, ContractError> {
    let mut shaped = event.clone();
    shaped.row = row;
    shaped.to_canonical_json()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn config(name: &str, kind: TransformType, pairs: &[(&str, &str)]) -> TransformConfig {
        TransformConfig {
            name: name.to_string(),
            transform_type: kind,
            params: params(pairs),
        }
    }

    #[test]
    fn test_build_registry() {
        let registry = build_registry(&[
            config("flat", TransformType::Flatten, &[]),
            config("pii", TransformType::Mask, &[("fields", "email")]),
            config("slim", TransformType::ReplaceField, &[("include", "id")]),
        ])
        .unwrap();

        assert_eq!(registry.names(), vec!["flat", "pii", "slim"]);
        let payload = registry.resolve("slim").unwrap().map(&order_event()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["row"], serde_json::json!({"id": 7}));
    }

    #[test]
    fn test_bad_params_rejected() {
        let err = build_registry(&[config(
            "flat",
            TransformType::Flatten,
            &[("max_depth", "deep")],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("transforms[flat].params.max_depth"));
    }

    #[test]
    fn test_list_param() {
        let p = params(&[("fields", " a, b ,,c ")]);
        assert_eq!(list_param(&p, "fields"), vec!["a", "b", "c"]);
        assert!(list_param(&p, "missing").is_empty());
    }
}
