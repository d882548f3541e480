//! Replay unit generation for recorded invocations.
//!
//! Each recorded call triple becomes an independent TypeScript module whose
//! `replay_wrapper()` re-executes the call against recorded inputs, with
//! every collaborator stubbed to its recorded outcome.
//!
//! # Modules
//!
//! - [`error`] -- Error types for all generation failure modes
//! - [`emitter`] -- Indented source writer
//! - [`literal`] -- TypeScript expressions for recorded values
//! - [`generate`] -- Single-unit synthesis
//! - [`pipeline`] -- Batch generation for a whole trace file

pub mod emitter;
pub mod error;
pub mod generate;
pub mod literal;
pub mod pipeline;

pub use error::CodegenError;
pub use generate::{generate_replay_source, replay_unit_file_name, PRELUDE};
pub use pipeline::run_replay;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use retrace_core::{CallId, FnId};

/// Options controlling replay generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOptions {
    /// Directory receiving generated units.
    /// `None` means the directory of the trace file being replayed.
    pub out_dir: Option<PathBuf>,

    /// Emit narrowed numeric kinds and synthesized shape names as type
    /// annotations.
    pub use_type_names: bool,
}

/// Outcome of a [`run_replay`] batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Call triples read from the trace file.
    pub triples: usize,

    /// Paths of the units written, in trace order.
    pub generated: Vec<PathBuf>,

    pub failures: Vec<ReplayFailure>,
}

/// One unit that could not be generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailure {
    pub fn_id: FnId,
    pub call_id: CallId,
    pub message: String,
}
