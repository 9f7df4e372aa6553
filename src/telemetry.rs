//! JSON-lines trace file for replaying what a navigation session did.
//!
//! Off unless `--logs` is given. Each line carries the emitting thread, so
//! events handled on the `wayfinder-nav` loop can be told apart from the
//! harness thread feeding it.

use crate::config::AppConfig;
use std::env;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::time::UtcTime;

pub const TRACE_LOG_ENV: &str = "WAYFINDER_TRACE_LOG";
const DEFAULT_TRACE_FILE: &str = "wayfinder_trace.jsonl";

/// Where traces should go, or `None` when tracing is switched off.
fn trace_target(config: &AppConfig, override_path: Option<OsString>) -> Option<PathBuf> {
    if !config.logs || config.no_logs {
        return None;
    }
    let path = override_path
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join(DEFAULT_TRACE_FILE));
    Some(path)
}

fn json_trace_subscriber(file: File) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_names(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(file)
        .finish()
}

fn open_trace_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the JSON trace subscriber when enabled and return the file it
/// writes to. A second call, or a file that cannot be opened, leaves
/// tracing as it was and returns `None`.
pub fn init_tracing(config: &AppConfig) -> Option<PathBuf> {
    let path = trace_target(config, env::var_os(TRACE_LOG_ENV))?;
    let file = open_trace_file(&path).ok()?;
    tracing::subscriber::set_global_default(json_trace_subscriber(file)).ok()?;
    Some(path)
}
