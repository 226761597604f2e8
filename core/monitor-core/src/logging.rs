//! Tracing setup shared by the daemon and the viewer.
//!
//! `RUST_LOG` picks the filter (default `info`); `ML_MONITOR_DEBUG_LOG=1` forces
//! `debug`. File output goes through a non-blocking appender whose guard must be
//! held for the life of the process so buffered lines are flushed on exit.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::error::{MonitorError, Result};

const DEBUG_ENV: &str = "ML_MONITOR_DEBUG_LOG";

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Logs to stderr.
pub fn init_stderr() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| MonitorError::Logging(err.to_string()))
}

/// Appends to `path`, creating its directory. Returns the flush guard.
pub fn init_file(path: &Path) -> Result<WorkerGuard> {
    let file_name = path
        .file_name()
        .ok_or_else(|| MonitorError::Logging(format!("{} is not a file path", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs_err::create_dir_all(dir).map_err(|source| MonitorError::DirectoryCreate {
        path: dir.to_path_buf(),
        source,
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(dir)
        .map_err(|err| MonitorError::Logging(format!("{}: {}", path.display(), err)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|err| MonitorError::Logging(err.to_string()))?;
    Ok(guard)
}

/// File logging when `path` is given, stderr otherwise.
pub fn init(path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    match path {
        Some(path) => init_file(path).map(Some),
        None => init_stderr().map(|()| None),
    }
}
