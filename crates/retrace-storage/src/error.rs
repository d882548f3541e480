//! Storage error types for retrace-storage.
//!
//! [`StorageError`] covers the failure modes of reading logs and persisting
//! the replay index. Index staleness is never an error; it triggers a rebuild.

use std::path::PathBuf;

use retrace_core::{CallId, FnId};
use thiserror::Error;

/// Errors produced by log reading and index operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure while reading logs or writing the index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A log line could not be decoded as a trace event.
    #[error("malformed log line {line} in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization of the index failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The index has no entry for the requested call.
    #[error("call {0} is not present in the replay index")]
    UnknownCall(CallId),

    /// One call id appears under two fnIds or in two log files, which
    /// happens when several recording sessions share a directory.
    #[error(
        "call {call_id} is recorded by both {first_fn} in {first_file} and {second_fn} in {second_file}; \
         keep each recording session in its own trace directory"
    )]
    DuplicateCall {
        call_id: CallId,
        first_fn: FnId,
        first_file: String,
        second_fn: FnId,
        second_file: String,
    },
}
