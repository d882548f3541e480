//! Persisted replay index over a trace directory.
//!
//! The index maps every call id to the log file and physical line numbers
//! holding its events, so a single invocation can be reconstructed without
//! decoding whole files. It is stored as [`INDEX_FILE_NAME`] next to the logs
//! and carries a snapshot of every log file's modification time and length.
//! When the snapshot no longer matches the directory the index is rebuilt
//! from scratch; a persisted index is therefore always re-derivable from the
//! logs alone.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use retrace_core::{CallId, CallTriple, FnId};

use crate::error::StorageError;
use crate::reader::{decode, group_into_triples, numbered_lines, read_events};
use crate::stale::{compute_stale_set, snapshot_dir, StaleSet};

pub use crate::stale::IndexedFile;

/// Name of the persisted index inside a trace directory.
pub const INDEX_FILE_NAME: &str = ".retrace_index.json";

/// Extension of trace log files.
pub const LOG_EXTENSION: &str = "jsonl";

/// Call-id to log-location map for one trace directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayIndex {
    /// Snapshot of the log files the index was built from.
    pub files: Vec<IndexedFile>,
    /// Every recorded call id and where its events live.
    pub calls: IndexMap<CallId, IndexEntry>,
    /// Directory the index was loaded from or built for.
    #[serde(skip)]
    root: PathBuf,
}

/// Where the events of one call id live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub fn_id: FnId,
    /// File name relative to the trace directory.
    pub file_path: String,
    /// Physical 1-based line numbers, ascending.
    pub line_numbers: Vec<usize>,
}

/// Result of [`ensure_index_traced`].
#[derive(Debug, Clone)]
pub struct IndexLoad {
    pub index: ReplayIndex,
    /// True if the directory was scanned during this call.
    pub rebuilt: bool,
    /// Differences that caused the rebuild (empty when loaded or absent).
    pub stale: StaleSet,
}

/// Only the keys of a log line; the rest of the event is skipped.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineKey {
    fn_id: FnId,
    call_id: CallId,
}

impl ReplayIndex {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry(&self, call_id: &CallId) -> Option<&IndexEntry> {
        self.calls.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Absolute path of a log file named in this index.
    pub fn resolve(&self, file_path: &str) -> PathBuf {
        self.root.join(file_path)
    }

    /// Scans every file of `snapshot` under `dir` and indexes its lines.
    ///
    /// Call ids restart at 1 in every recording session, so one id seen in
    /// two files, or under two fnIds, means the directory mixes sessions.
    /// That is reported as [`StorageError::DuplicateCall`] instead of merging
    /// unrelated events into one entry.
    pub fn build(dir: &Path, snapshot: Vec<IndexedFile>) -> Result<Self, StorageError> {
        let mut calls: IndexMap<CallId, IndexEntry> = IndexMap::new();

        for file in &snapshot {
            let path = dir.join(&file.path);
            for (line, text) in numbered_lines(&path)? {
                let key: LineKey =
                    serde_json::from_str(&text).map_err(|source| StorageError::Parse {
                        path: path.clone(),
                        line,
                        source,
                    })?;
                match calls.get_mut(&key.call_id) {
                    Some(entry) if entry.file_path == file.path && entry.fn_id == key.fn_id => {
                        entry.line_numbers.push(line);
                    }
                    Some(entry) => {
                        tracing::warn!(
                            call_id = %key.call_id,
                            first = %entry.file_path,
                            second = %file.path,
                            "call id recorded by more than one session"
                        );
                        return Err(StorageError::DuplicateCall {
                            call_id: key.call_id,
                            first_fn: entry.fn_id.clone(),
                            first_file: entry.file_path.clone(),
                            second_fn: key.fn_id,
                            second_file: file.path.clone(),
                        });
                    }
                    None => {
                        calls.insert(
                            key.call_id,
                            IndexEntry {
                                fn_id: key.fn_id,
                                file_path: file.path.clone(),
                                line_numbers: vec![line],
                            },
                        );
                    }
                }
            }
        }

        Ok(ReplayIndex {
            files: snapshot,
            calls,
            root: dir.to_path_buf(),
        })
    }

    /// Writes the index to `<dir>/.retrace_index.json`.
    pub fn save(&self, dir: &Path) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = dir.join(format!("{INDEX_FILE_NAME}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, dir.join(INDEX_FILE_NAME))?;
        Ok(())
    }

    /// Loads a persisted index.
    ///
    /// Returns `None` if the file doesn't exist or can't be parsed.
    pub fn load(dir: &Path) -> Option<Self> {
        let data = fs::read_to_string(dir.join(INDEX_FILE_NAME)).ok()?;
        match serde_json::from_str::<ReplayIndex>(&data) {
            Ok(mut index) => {
                index.root = dir.to_path_buf();
                Some(index)
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "discarding unreadable replay index");
                None
            }
        }
    }
}

/// Returns a valid index for `dir`, rebuilding and persisting it if needed.
pub fn ensure_index(dir: &Path) -> Result<ReplayIndex, StorageError> {
    Ok(ensure_index_traced(dir)?.index)
}

/// Like [`ensure_index`], also reporting whether a rebuild happened and why.
pub fn ensure_index_traced(dir: &Path) -> Result<IndexLoad, StorageError> {
    let current = snapshot_dir(dir)?;

    let stale = match ReplayIndex::load(dir) {
        Some(index) => {
            let stale = compute_stale_set(&index.files, &current);
            if !index.files.is_empty() && stale.is_clean() {
                tracing::debug!(dir = %dir.display(), calls = index.len(), "replay index is current");
                return Ok(IndexLoad {
                    index,
                    rebuilt: false,
                    stale,
                });
            }
            tracing::debug!(
                added = ?stale.added,
                modified = ?stale.modified,
                removed = ?stale.removed,
                "replay index is stale"
            );
            stale
        }
        None => StaleSet::default(),
    };

    let index = ReplayIndex::build(dir, current)?;
    index.save(dir)?;
    tracing::info!(
        dir = %dir.display(),
        files = index.files.len(),
        calls = index.len(),
        "rebuilt replay index"
    );

    Ok(IndexLoad {
        index,
        rebuilt: true,
        stale,
    })
}

/// Reconstructs the triple of `call_id`, decoding only its recorded lines.
pub fn find_triple(call_id: &CallId, index: &ReplayIndex) -> Result<Option<CallTriple>, StorageError> {
    let Some(entry) = index.entry(call_id) else {
        return Ok(None);
    };
    let path = index.resolve(&entry.file_path);
    let wanted: BTreeSet<usize> = entry.line_numbers.iter().copied().collect();
    let Some(&last) = wanted.iter().next_back() else {
        return Ok(None);
    };

    let reader = BufReader::new(File::open(&path)?);
    let mut events = Vec::with_capacity(wanted.len());
    for (idx, line) in reader.lines().enumerate() {
        let number = idx + 1;
        if number > last {
            break;
        }
        let line = line?;
        if wanted.contains(&number) && !line.trim().is_empty() {
            events.push(decode(&path, number, &line)?);
        }
    }

    Ok(group_into_triples(events)
        .into_iter()
        .find(|t| t.call_id() == Some(call_id)))
}

/// Like [`find_triple`], failing with [`StorageError::UnknownCall`] when the
/// index has no entry or the entry's lines no longer hold the call.
pub fn require_triple(call_id: &CallId, index: &ReplayIndex) -> Result<CallTriple, StorageError> {
    find_triple(call_id, index)?.ok_or_else(|| StorageError::UnknownCall(call_id.clone()))
}

/// Every triple of the log file that holds `call_id`.
pub fn find_all_triples(call_id: &CallId, index: &ReplayIndex) -> Result<Vec<CallTriple>, StorageError> {
    let Some(entry) = index.entry(call_id) else {
        return Ok(Vec::new());
    };
    let events = read_events(&index.resolve(&entry.file_path))?;
    Ok(group_into_triples(events))
}

/// The triples of `call_id`'s file that belong to the same call site.
pub fn find_site_triples(call_id: &CallId, index: &ReplayIndex) -> Result<Vec<CallTriple>, StorageError> {
    let Some(entry) = index.entry(call_id) else {
        return Ok(Vec::new());
    };
    Ok(find_all_triples(call_id, index)?
        .into_iter()
        .filter(|t| t.fn_id() == Some(&entry.fn_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_none_for_missing_or_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayIndex::load(dir.path()).is_none());
        fs::write(dir.path().join(INDEX_FILE_NAME), "{ not json").unwrap();
        assert!(ReplayIndex::load(dir.path()).is_none());
    }

    #[test]
    fn save_then_load_restores_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = ReplayIndex::default();
        index.calls.insert(
            CallId::from_counter(1),
            IndexEntry {
                fn_id: FnId::new("a.ts#-#f#L1C1"),
                file_path: "a.jsonl".into(),
                line_numbers: vec![1, 3],
            },
        );
        index.save(dir.path()).unwrap();

        let back = ReplayIndex::load(dir.path()).unwrap();
        assert_eq!(back.root(), dir.path());
        assert_eq!(back.calls, index.calls);
        assert_eq!(back.resolve("a.jsonl"), dir.path().join("a.jsonl"));
        assert!(!dir.path().join(format!("{INDEX_FILE_NAME}.tmp")).exists());
    }

    #[test]
    fn unknown_call_yields_nothing() {
        let index = ReplayIndex::default();
        let id = CallId::from_counter(99);
        assert!(find_triple(&id, &index).unwrap().is_none());
        assert!(find_all_triples(&id, &index).unwrap().is_empty());
        assert!(find_site_triples(&id, &index).unwrap().is_empty());
        assert!(matches!(
            require_triple(&id, &index),
            Err(StorageError::UnknownCall(c)) if c == id
        ));
    }
}
