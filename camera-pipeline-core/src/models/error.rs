use thiserror::Error;

/// Errors that can occur while building, driving, or tearing down a pipeline.
///
/// Setup-phase errors propagate to the caller. Completion-phase errors are
/// reported to the session delegate and never escalate. Teardown only logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Component creation or another device call could not be serviced.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Unknown port or role, or the device exposes too few ports.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Buffer pool allocation failed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Format commit failed, or a profile/level has no valid mapping.
    #[error("format rejected: {0}")]
    FormatRejected(String),

    /// Flagged on a completed buffer, never on the call that sent it.
    #[error("buffer transmission failed")]
    TransmissionFailed,

    /// An operation was attempted out of lifecycle order.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}
