//! Staleness detection for the replay index.
//!
//! Compares the file snapshot recorded in a persisted index against the
//! current contents of the trace directory. Any added, modified or removed
//! log file makes the index stale; the caller then rebuilds it from scratch.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::index::LOG_EXTENSION;

/// One log file as seen when the index was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedFile {
    /// File name relative to the trace directory.
    pub path: String,
    /// Last modification time in nanoseconds since the Unix epoch.
    pub modified_ns: u64,
    /// File length in bytes.
    pub len: u64,
}

/// The log files that differ between an index snapshot and its directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleSet {
    /// Present in the directory but not in the snapshot.
    pub added: BTreeSet<String>,
    /// Present in both with a different modification time or length.
    pub modified: BTreeSet<String>,
    /// Present in the snapshot but gone from the directory.
    pub removed: BTreeSet<String>,
}

impl StaleSet {
    /// Returns true if the snapshot still matches the directory.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Lists the log files of `dir`, sorted by name.
pub fn snapshot_dir(dir: &Path) -> Result<Vec<IndexedFile>, StorageError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified_ns = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        files.push(IndexedFile {
            path: entry.file_name().to_string_lossy().into_owned(),
            modified_ns,
            len: meta.len(),
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Compute the stale set between a previous snapshot and the current one.
pub fn compute_stale_set(previous: &[IndexedFile], current: &[IndexedFile]) -> StaleSet {
    let mut stale = StaleSet::default();

    for file in current {
        match previous.iter().find(|p| p.path == file.path) {
            Some(prev) => {
                if prev.modified_ns != file.modified_ns || prev.len != file.len {
                    stale.modified.insert(file.path.clone());
                }
            }
            None => {
                stale.added.insert(file.path.clone());
            }
        }
    }

    for prev in previous {
        if !current.iter().any(|f| f.path == prev.path) {
            stale.removed.insert(prev.path.clone());
        }
    }

    stale
}
