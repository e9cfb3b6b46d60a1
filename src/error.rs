use thiserror::Error;

/// Classified failure modes of pipeline stages.
///
/// Only `Validation` halts the run; everything else is recorded on the
/// shared state and execution continues with degraded inputs.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("image validation failed: {0}")]
    Validation(String),

    #[error("{adapter} adapter timed out after {timeout_ms}ms")]
    AdapterTimeout {
        adapter: &'static str,
        timeout_ms: u64,
    },

    #[error("{adapter} adapter unavailable: {reason}")]
    AdapterUnavailable {
        adapter: &'static str,
        reason: String,
    },

    #[error("classifier response could not be parsed into candidates")]
    MalformedResponse,

    #[error("{stage} stage failed: {reason}")]
    Downstream { stage: &'static str, reason: String },
}
