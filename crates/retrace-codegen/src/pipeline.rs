//! Batch replay generation for one trace file.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use retrace_core::{CallId, CallTriple, FnId};
use retrace_infer::narrow_call_site;
use retrace_storage::{ensure_index, group_into_triples, read_events, ReplayIndex};

use crate::error::CodegenError;
use crate::generate::{generate_replay_source, replay_unit_file_name};
use crate::{ReplayFailure, ReplayOptions, ReplayReport};

/// Generates one replay unit per recorded invocation of `trace_file`.
///
/// The trace file's directory is indexed first so collaborators recorded in
/// sibling logs can be resolved. Failing units are reported in
/// [`ReplayReport::failures`] and skipped; only reading the trace or
/// preparing the output directory aborts the run.
pub fn run_replay(trace_file: &Path, options: &ReplayOptions) -> Result<ReplayReport, CodegenError> {
    let trace_dir = trace_file
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .ok_or_else(|| CodegenError::NoTraceDir(trace_file.to_path_buf()))?;
    let index = ensure_index(trace_dir)?;

    let mut triples = group_into_triples(read_events(trace_file)?);
    if options.use_type_names {
        narrow_by_site(&mut triples);
    }

    let out_dir = options.out_dir.clone().unwrap_or_else(|| trace_dir.to_path_buf());
    fs::create_dir_all(&out_dir)?;

    let mut report = ReplayReport {
        triples: triples.len(),
        ..ReplayReport::default()
    };
    for triple in &triples {
        let Some(enter) = &triple.enter else {
            tracing::debug!(call_id = ?triple.call_id(), "skipping call without enter event");
            continue;
        };
        match write_unit(triple, &enter.fn_id, &enter.call_id, &index, options, &out_dir) {
            Ok(path) => report.generated.push(path),
            Err(e) => {
                tracing::warn!(
                    fn_id = %enter.fn_id,
                    call_id = %enter.call_id,
                    error = %e,
                    "replay unit generation failed"
                );
                report.failures.push(ReplayFailure {
                    fn_id: enter.fn_id.clone(),
                    call_id: enter.call_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        trace = %trace_file.display(),
        generated = report.generated.len(),
        failed = report.failures.len(),
        "replay generation finished"
    );
    Ok(report)
}

fn write_unit(
    triple: &CallTriple,
    fn_id: &FnId,
    call_id: &CallId,
    index: &ReplayIndex,
    options: &ReplayOptions,
    out_dir: &Path,
) -> Result<PathBuf, CodegenError> {
    let source = generate_replay_source(triple, index, options)?;
    let path = out_dir.join(replay_unit_file_name(fn_id, call_id));
    fs::write(&path, source)?;
    Ok(path)
}

/// Replaces each triple's descriptors with those narrowed across every
/// triple of the same fnId.
fn narrow_by_site(triples: &mut [CallTriple]) {
    let mut sites: IndexMap<FnId, Vec<usize>> = IndexMap::new();
    for (i, triple) in triples.iter().enumerate() {
        if let Some(fn_id) = triple.fn_id() {
            sites.entry(fn_id.clone()).or_default().push(i);
        }
    }
    for members in sites.values() {
        let samples: Vec<CallTriple> = members.iter().map(|&i| triples[i].clone()).collect();
        let Some(sig) = narrow_call_site(&samples) else {
            continue;
        };
        for &i in members {
            triples[i] = sig.apply(&triples[i]);
        }
    }
}
