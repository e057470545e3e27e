//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{connect_store, install_capture, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
