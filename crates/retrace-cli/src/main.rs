//! Retrace command-line tools.
//!
//! Provides the `retrace` binary. `replay` turns a recorded trace file into
//! one replay unit per invocation; `index` refreshes a trace directory's
//! replay index and reports what changed.
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use retrace_codegen::{CodegenError, ReplayOptions};
use retrace_storage::StorageError;

/// Record-and-replay tooling for traced programs.
#[derive(Parser)]
#[command(name = "retrace", about = "Record-and-replay tooling for traced programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate replay units for every invocation in a trace file.
    Replay {
        /// Path to a `.jsonl` trace file.
        trace_file: PathBuf,

        /// Output directory (default: the trace file's directory).
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Annotate bindings with narrowed numeric kinds and shape names.
        #[arg(long)]
        typed: bool,
    },

    /// Rebuild a trace directory's replay index if it is stale.
    Index {
        /// Trace directory.
        dir: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Replay {
            trace_file,
            out_dir,
            typed,
        } => run_replay(&trace_file, out_dir, typed),
        Commands::Index { dir } => run_index(&dir),
    };
    process::exit(exit_code);
}

/// Execute the replay subcommand.
///
/// Returns exit code: 0 = success (per-unit failures are listed in the
/// report), 1 = unusable arguments, 3 = I/O or index error.
fn run_replay(trace_file: &Path, out_dir: Option<PathBuf>, typed: bool) -> i32 {
    let options = ReplayOptions {
        out_dir,
        use_type_names: typed,
    };

    match retrace_codegen::run_replay(trace_file, &options) {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize report: {}\"}}", e)
            });
            println!("{}", json);
            0
        }
        Err(e @ (CodegenError::Io(_) | CodegenError::Storage(_))) => {
            eprintln!("I/O error: {}", e);
            3
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Execute the index subcommand. Returns 0 on success, 3 on I/O or
/// index error.
fn run_index(dir: &Path) -> i32 {
    match retrace_storage::ensure_index_traced(dir) {
        Ok(load) => {
            let summary = serde_json::json!({
                "rebuilt": load.rebuilt,
                "files": load.index.files.len(),
                "calls": load.index.len(),
                "added": load.stale.added,
                "modified": load.stale.modified,
                "removed": load.stale.removed,
            });
            println!("{:#}", summary);
            0
        }
        Err(StorageError::Io(e)) => {
            eprintln!("I/O error: failed to index '{}': {}", dir.display(), e);
            3
        }
        Err(e) => {
            eprintln!("Index error: {}", e);
            3
        }
    }
}
