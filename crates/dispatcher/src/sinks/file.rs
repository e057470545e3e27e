//! FileSink - appends payloads to a JSON Lines file

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use contracts::{CapturedEvent, ContractError, DataSink};
use tracing::{debug, error, info, instrument};

/// File rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Never,
    /// New file per UTC day, `name-YYYY-MM-DD.ext`
    Daily,
}

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub rotation: Rotation,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        let rotation = match params.get("rotate").map(|s| s.trim()) {
            None | Some("") | Some("never") => Rotation::Never,
            Some("daily") => Rotation::Daily,
            Some(other) => return Err(format!("unknown rotation '{other}'")),
        };

        Ok(Self { path, rotation })
    }

    /// Target file for a given day
    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        match self.rotation {
            Rotation::Never => self.path.clone(),
            Rotation::Daily => dated_path(&self.path, day),
        }
    }
}

fn dated_path(path: &Path, day: NaiveDate) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}-{}.{}", day.format("%Y-%m-%d"), ext.to_string_lossy()),
        None => format!("{stem}-{}", day.format("%Y-%m-%d")),
    };
    path.with_file_name(file_name)
}

/// Sink that appends one payload per line
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    current: Option<(PathBuf, File)>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            name: name.into(),
            config,
            current: None,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Self::new(name, config)
    }

    fn file_for_today(&mut self) -> std::io::Result<&mut File> {
        let target = self.config.path_for(Utc::now().date_naive());
        let reopen = !matches!(&self.current, Some((path, _)) if *path == target);
        if reopen {
            let file = OpenOptions::new().create(true).append(true).open(&target)?;
            debug!(sink = %self.name, path = %target.display(), "Opened output file");
            self.current = Some((target, file));
        }
        match self.current.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(std::io::Error::other("output file not open")),
        }
    }

    fn append_line(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let file = self.file_for_today()?;
        file.write_all(payload)?;
        file.write_all(b"\n")?;
        file.flush()
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_publish",
        skip(self, event, payload),
        fields(sink = %self.name, event_id = event.id)
    )]
    async fn publish(
        &mut self,
        event: &CapturedEvent,
        payload: &[u8],
    ) -> Result<(), ContractError> {
        self.append_line(payload).map_err(|e| {
            error!(sink = %self.name, event_id = event.id, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some((_, file)) = self.current.as_mut() {
            file.sync_data()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.current = None;
        info!(sink = %self.name, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}
