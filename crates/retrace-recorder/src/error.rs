//! Recorder error types.

use retrace_core::Invocation;

/// Errors raised while recording or flushing events.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Filesystem failure while appending to a log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `exit` did not match the innermost live invocation. The collaborator
    /// broke the LIFO discipline; the call stack is left untouched.
    #[error(
        "exit of {exiting} does not match innermost live invocation {}",
        .innermost.as_ref().map(ToString::to_string).unwrap_or_else(|| "<none>".to_string())
    )]
    StackMismatch {
        exiting: Invocation,
        innermost: Option<Invocation>,
    },
}
