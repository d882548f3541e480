//! Recorder runtime configuration.
//!
//! Reads configuration from environment variables:
//! - `RETRACE_DIR`: trace directory (default: `./.retrace`)
//! - `RETRACE_GROUP_BY_FUNC`: one log file per fnId (default: true;
//!   `false` or `0` write a single combined `trace.jsonl`)
//! - `RETRACE_FLUSH_THRESHOLD`: buffered event count that triggers an
//!   in-band flush (default: 1024)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ENV_TRACE_DIR: &str = "RETRACE_DIR";
pub const ENV_GROUP_BY_FUNC: &str = "RETRACE_GROUP_BY_FUNC";
pub const ENV_FLUSH_THRESHOLD: &str = "RETRACE_FLUSH_THRESHOLD";

/// File name of the combined log when grouping by function is disabled.
pub const COMBINED_LOG_NAME: &str = "trace.jsonl";

const DEFAULT_TRACE_DIR: &str = ".retrace";
const DEFAULT_FLUSH_THRESHOLD: usize = 1024;

/// Where and how a recorder session writes its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory receiving the `.jsonl` logs.
    pub trace_dir: PathBuf,
    /// One file per fnId when true, a single combined file otherwise.
    pub group_by_function: bool,
    /// Buffered event count at which the session flushes synchronously.
    pub event_flush_threshold: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            trace_dir: PathBuf::from(DEFAULT_TRACE_DIR),
            group_by_function: true,
            event_flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl RecorderConfig {
    /// A default configuration writing into `trace_dir`.
    pub fn new(trace_dir: impl Into<PathBuf>) -> Self {
        RecorderConfig {
            trace_dir: trace_dir.into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RecorderConfig::default();

        let trace_dir = lookup(ENV_TRACE_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.trace_dir);

        let group_by_function = match lookup(ENV_GROUP_BY_FUNC) {
            Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0"),
            None => defaults.group_by_function,
        };

        let event_flush_threshold = match lookup(ENV_FLUSH_THRESHOLD) {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(value = %v, "ignoring invalid {ENV_FLUSH_THRESHOLD}");
                    defaults.event_flush_threshold
                }
            },
            None => defaults.event_flush_threshold,
        };

        RecorderConfig {
            trace_dir,
            group_by_function,
            event_flush_threshold,
        }
    }
}
