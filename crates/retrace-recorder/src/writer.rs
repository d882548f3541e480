//! Buffered, append-only event writer.
//!
//! Events are grouped into per-destination buffers and appended to disk as
//! newline-delimited JSON. Both flush paths take the buffers before doing any
//! I/O, so events recorded while a flush is in progress start a fresh batch
//! instead of being lost or written twice. Appends to one destination keep
//! their recorded order; distinct destinations may be written concurrently by
//! [`EventBuffer::flush_async`].

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;

use retrace_core::{sanitize_segment, FnId, TraceEvent};

use crate::config::{RecorderConfig, COMBINED_LOG_NAME};
use crate::error::RecorderError;

/// Pending events keyed by destination file.
#[derive(Debug)]
pub struct EventBuffer {
    config: RecorderConfig,
    pending: IndexMap<PathBuf, Vec<TraceEvent>>,
    count: usize,
}

impl EventBuffer {
    pub fn new(config: RecorderConfig) -> Self {
        EventBuffer {
            config,
            pending: IndexMap::new(),
            count: 0,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Log file receiving the events of `fn_id`.
    pub fn destination(&self, fn_id: &FnId) -> PathBuf {
        if self.config.group_by_function {
            self.config
                .trace_dir
                .join(format!("{}.jsonl", sanitize_segment(fn_id.as_str())))
        } else {
            self.config.trace_dir.join(COMBINED_LOG_NAME)
        }
    }

    /// Number of buffered events across all destinations.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Buffered events in destination order, then recorded order.
    pub fn pending(&self) -> impl Iterator<Item = &TraceEvent> {
        self.pending.values().flatten()
    }

    /// Buffers `event`, flushing synchronously once the threshold is reached.
    ///
    /// Returns `true` if this push triggered a flush.
    pub fn push(&mut self, event: TraceEvent) -> Result<bool, RecorderError> {
        self.enqueue(event);
        self.flush_if_due()
    }

    /// Buffers `event` without checking the threshold.
    pub fn enqueue(&mut self, event: TraceEvent) {
        let path = self.destination(event.fn_id());
        self.pending.entry(path).or_default().push(event);
        self.count += 1;
    }

    /// Flushes synchronously if the threshold has been reached.
    ///
    /// Returns `true` if a flush ran.
    pub fn flush_if_due(&mut self) -> Result<bool, RecorderError> {
        if self.count < self.config.event_flush_threshold {
            return Ok(false);
        }
        self.flush_sync()?;
        Ok(true)
    }

    /// Appends every buffered event, blocking until done.
    ///
    /// Returns the number of events written. Errors propagate; the failed
    /// batch has already left the buffer.
    pub fn flush_sync(&mut self) -> Result<usize, RecorderError> {
        let batch = self.take();
        let mut written = 0;
        for (path, events) in batch {
            let data = encode(&events)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(data.as_bytes())?;
            written += events.len();
        }
        if written > 0 {
            tracing::debug!(events = written, "flushed trace events");
        }
        Ok(written)
    }

    /// Appends every buffered event with one task per destination.
    ///
    /// All destinations are attempted; the first failure is returned.
    pub async fn flush_async(&mut self) -> Result<usize, RecorderError> {
        let batch = self.take();
        let mut tasks = JoinSet::new();
        for (path, events) in batch {
            let data = encode(&events)?;
            let count = events.len();
            tasks.spawn(async move {
                append_async(&path, data.as_bytes()).await?;
                Ok::<usize, std::io::Error>(count)
            });
        }

        let mut written = 0;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(std::io::Error::other) {
                Ok(Ok(count)) => written += count,
                Ok(Err(e)) | Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }
        if written > 0 {
            tracing::debug!(events = written, "flushed trace events asynchronously");
        }
        Ok(written)
    }

    fn take(&mut self) -> IndexMap<PathBuf, Vec<TraceEvent>> {
        self.count = 0;
        std::mem::take(&mut self.pending)
    }
}

fn encode(events: &[TraceEvent]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    Ok(out)
}

async fn append_async(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}
