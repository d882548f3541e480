//! Core error types for retrace-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! malformed trace input. Every variant is scoped to a single triple or
//! identity; none of them is fatal to a batch.

use thiserror::Error;

use crate::id::CallId;

/// Core errors produced by the retrace-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A fnId did not have the `<path>#<type>#<name>#<pos>` layout.
    #[error("malformed fnId: '{fn_id}'")]
    MalformedFnId { fn_id: String },

    /// `args` and `argsTypes` of an enter event have different lengths.
    #[error("call {call_id}: {args} args but {types} arg types")]
    ArgsTypesMismatch {
        call_id: CallId,
        args: usize,
        types: usize,
    },

    /// `env` and `envTypes` of one event do not share a key set.
    #[error("call {call_id}: env and envTypes keys differ ({detail})")]
    EnvTypesMismatch { call_id: CallId, detail: String },

    /// Enter and exit env snapshots of one call do not share a key set.
    #[error("call {call_id}: enter env keys [{enter}] differ from exit env keys [{exit}]")]
    EnvKeySetMismatch {
        call_id: CallId,
        enter: String,
        exit: String,
    },

    /// A triple lacks an event that the caller requires.
    #[error("incomplete triple for call {call_id}: missing {missing} event")]
    IncompleteTriple {
        call_id: CallId,
        missing: &'static str,
    },
}
