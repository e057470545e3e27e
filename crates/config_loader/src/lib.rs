//! # Config Loader
//!
//! Manifest loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON manifests
//! - Validate configuration legality
//! - Produce a `Blueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("tablecast.toml")).unwrap();
//! println!("Tables: {:?}", blueprint.source.tables);
//! ```

mod env;
mod parser;
mod validator;

pub use contracts::Blueprint;
pub use env::{expand_env_vars, expand_with};
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Manifest loader
///
/// Provides static methods to load a manifest from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load manifest from file path
    ///
    /// Automatically detects format from file extension (.toml / .json) and
    /// expands `${VAR}` / `${VAR:-default}` from the environment before parsing.
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<Blueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = env::expand_env_vars(&Self::read_file(path)?)?;
        Self::load_from_str(&content, format)
    }

    /// Load manifest from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Blueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize Blueprint to TOML string
    pub fn to_toml(blueprint: &Blueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize Blueprint to JSON string
    pub fn to_json(blueprint: &Blueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer manifest format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read manifest content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate manifest content
    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<Blueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
