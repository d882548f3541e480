//! Trace log reading.
//!
//! Logs are append-only and written by a single recorder, so a line that
//! fails to decode is a hard error for the read rather than something to
//! skip. Blank lines are ignored but still counted, so line numbers always
//! refer to physical 1-based lines of the file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indexmap::IndexMap;

use retrace_core::{CallId, CallTriple, TraceEvent};

use crate::error::StorageError;

/// Decodes one log line.
pub fn parse_line(line: &str) -> Result<TraceEvent, serde_json::Error> {
    serde_json::from_str(line)
}

/// Reads every event of a log file, in file order.
pub fn read_events(path: &Path) -> Result<Vec<TraceEvent>, StorageError> {
    numbered_lines(path)?
        .into_iter()
        .map(|(line, text)| decode(path, line, &text))
        .collect()
}

/// Groups events into triples keyed by call id.
///
/// The output keeps the order in which each call id was first seen, which is
/// not necessarily the order in which the calls started: in a shared log a
/// child's enter event precedes its parent's call and exit events.
pub fn group_into_triples(events: impl IntoIterator<Item = TraceEvent>) -> Vec<CallTriple> {
    let mut by_call: IndexMap<CallId, CallTriple> = IndexMap::new();
    for event in events {
        by_call
            .entry(event.call_id().clone())
            .or_default()
            .absorb(event);
    }
    by_call.into_values().collect()
}

/// Non-blank lines of a file paired with their physical 1-based line number.
pub(crate) fn numbered_lines(path: &Path) -> Result<Vec<(usize, String)>, StorageError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push((idx + 1, line));
        }
    }
    Ok(lines)
}

pub(crate) fn decode(path: &Path, line: usize, text: &str) -> Result<TraceEvent, StorageError> {
    parse_line(text).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        line,
        source,
    })
}
