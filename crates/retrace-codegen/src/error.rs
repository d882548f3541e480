//! Codegen error types covering every replay generation failure mode.

use std::path::PathBuf;

use retrace_core::{CallId, CoreError, FnId, Invocation};
use retrace_storage::StorageError;

/// Errors that can occur while generating replay units.
///
/// Everything except [`CodegenError::Storage`] and [`CodegenError::Io`]
/// raised by the batch pipeline is scoped to one unit; the pipeline records
/// it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// Malformed trace input (bad fnId, mismatched type lists, ...).
    #[error("malformed trace: {0}")]
    Core(#[from] CoreError),

    /// Log reading or index maintenance failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Filesystem I/O error while writing units.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The triple to replay has no enter event.
    #[error("call {call_id} has no enter event to replay")]
    MissingEnter { call_id: CallId },

    /// Pre-call and post-call environment snapshots differ in size.
    #[error("call {call_id}: enter env has {enter} entries but exit env has {exit}")]
    EnvSizeMismatch {
        call_id: CallId,
        enter: usize,
        exit: usize,
    },

    /// A recorded child invocation cannot be found through the index.
    #[error("call {parent}: child invocation {child} is not in the replay index")]
    UnknownChild { parent: CallId, child: Invocation },

    /// The index resolves a child's call id to a different function, as
    /// happens when a directory mixes recording sessions.
    #[error("call {parent}: child invocation {child} resolves to {}", .found.as_ref().map_or("no fnId", |f| f.as_str()))]
    ChildMismatch {
        parent: CallId,
        child: Invocation,
        found: Option<FnId>,
    },

    /// The trace file has no parent directory to index.
    #[error("trace file {} has no containing directory", .0.display())]
    NoTraceDir(PathBuf),
}
