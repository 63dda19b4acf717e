use thiserror::Error;

/// Failure kinds shared by every stage of the pipeline.
///
/// Higher layers carry these inside `anyhow::Error`; callers that need to
/// branch on the kind use `downcast_ref::<PipelineError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    #[error("interpolator unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("encoder failure: {0}")]
    EncoderFailure(String),

    #[error("queue protocol violation: {0}")]
    QueueProtocolViolation(&'static str),

    /// The producer went away without pushing the end marker.
    #[error("producer stopped before the end marker")]
    ProducerAborted,

    #[error("frame size mismatch: expected {expected} bytes, got {got}")]
    FrameSizeMismatch { expected: usize, got: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
