//! `install` command implementation.

use anyhow::Result;
use tracing::info;

use super::load_blueprint;
use crate::cli::InstallArgs;
use crate::pipeline::{connect_store, install_capture};

/// Execute the `install` command
///
/// Safe to repeat: every statement is idempotent.
pub async fn run_install(args: &InstallArgs) -> Result<()> {
    let mut blueprint = load_blueprint(&args.config)?;
    if let Some(ref dsn) = args.dsn {
        info!("Overriding source DSN from CLI");
        blueprint.source.dsn = dsn.clone();
    }

    let mut store = connect_store(&blueprint.source).await?;
    install_capture(&mut store, &blueprint.source.tables).await?;

    println!("✓ Change capture installed for:");
    for table in &blueprint.source.tables {
        println!("  - {}", table);
    }
    Ok(())
}
