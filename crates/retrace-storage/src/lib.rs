//! Log reading and replay indexing for retrace trace directories.
//!
//! A trace directory holds append-only `.jsonl` logs, one serialized
//! [`TraceEvent`](retrace_core::TraceEvent) per line. This crate reads them
//! back and maintains a persisted [`ReplayIndex`] mapping every call id to
//! the file and lines that carry its events.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`reader`]: line parsing and call-triple grouping
//! - [`stale`]: snapshot comparison between an index and its directory
//! - [`index`]: index build/load/validate and triple lookup

pub mod error;
pub mod index;
pub mod reader;
pub mod stale;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use index::{
    ensure_index, ensure_index_traced, find_all_triples, find_site_triples, find_triple,
    require_triple, IndexEntry, IndexLoad, IndexedFile, ReplayIndex, INDEX_FILE_NAME,
    LOG_EXTENSION,
};
pub use reader::{group_into_triples, parse_line, read_events};
pub use stale::{compute_stale_set, snapshot_dir, StaleSet};
