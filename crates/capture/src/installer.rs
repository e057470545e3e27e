//! Installer - provisions capture for the monitored tables

use contracts::ChangeStore;
use tracing::{info, Instrument};

use crate::{CaptureError, Result};

/// One-shot provisioning of the change log and triggers
///
/// Safe to run on every start: installation is idempotent and atomic.
#[derive(Debug, Clone)]
pub struct Installer {
    tables: Vec<String>,
}

impl Installer {
    pub fn new(tables: Vec<String>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Install against `store`
    ///
    /// # Errors
    /// `Provisioning` (fatal) when any statement fails; nothing is left half-installed.
    pub async fn install<S: ChangeStore>(&self, store: &mut S) -> Result<()> {
        let span = tracing::info_span!("install", tables = self.tables.len());
        async {
            info!(tables = ?self.tables, "Installing change capture");
            store.install(&self.tables).await?;
            info!("Change capture installed");
            Ok::<_, CaptureError>(())
        }
        .instrument(span)
        .await
    }
}
