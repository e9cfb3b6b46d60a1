// src/pipeline/mod.rs

pub mod metrics;
pub mod orchestrator;
pub mod state;

pub use metrics::PipelineMetrics;
pub use orchestrator::Orchestrator;
pub use state::{PipelineInput, PipelineReport, PipelineState};
