use thiserror::Error;

/// Failures of a single analysis run.
///
/// Capacity overflow and out-of-range parameters are deliberately absent:
/// the first truncates the result set, the second is clamped at write time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("{name} is no valid buffer")]
    BufferNotFound { name: String },

    #[error("can't access buffer {name}")]
    BufferUnreadable { name: String },

    #[error("no buffer bound")]
    NoBufferBound,

    #[error("unsupported onset method '{method}' (expected one of: {})", crate::onset::OnsetMethod::NAMES.join(", "))]
    UnsupportedMethod { method: String },

    #[error("invalid analysis setup: {0}")]
    InvalidSetup(String),

    #[error("an analysis run is already in flight")]
    Busy,

    #[error("scheduler has shut down")]
    SchedulerClosed,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
