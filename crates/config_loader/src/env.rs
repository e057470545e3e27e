//! `${VAR}` / `${VAR:-default}` expansion in manifest text
//!
//! Runs on the raw text before parsing, so secrets such as the DSN password can
//! stay out of the file.

use std::sync::LazyLock;

use contracts::ContractError;
use regex::{Captures, Regex};

static ENV_VAR: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}"));

/// Expand references using the process environment
pub fn expand_env_vars(content: &str) -> Result<String, ContractError> {
    expand_with(content, |name| std::env::var(name).ok())
}

/// Expand references using `lookup`
///
/// An unset variable without a default is an error.
pub fn expand_with<F>(content: &str, lookup: F) -> Result<String, ContractError>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = ENV_VAR
        .as_ref()
        .map_err(|e| ContractError::config_parse(format!("invalid env pattern: {e}")))?;

    let mut missing = Vec::new();
    let expanded = pattern.replace_all(content, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(expanded.into_owned())
    } else {
        missing.sort_unstable();
        missing.dedup();
        Err(ContractError::config_parse(format!(
            "environment variable(s) not set: {}",
            missing.join(", ")
        )))
    }
}
