//! Command implementations.

mod info;
mod install;
mod run;
mod validate;

use std::path::Path;

use contracts::Blueprint;

use crate::error::CliError;

pub use info::run_info;
pub use install::run_install;
pub use run::run_pipeline;
pub use validate::run_validate;

/// Load and validate the manifest at `path`
pub(crate) fn load_blueprint(path: &Path) -> Result<Blueprint, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    config_loader::ConfigLoader::load_from_path(path)
        .map_err(|e| CliError::config_load(path.display().to_string(), e))
}
