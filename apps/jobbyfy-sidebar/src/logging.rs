//! Tracing subscriber for the `jobbyfy` process.
//!
//! Library events use `bridge.*` targets and this binary logs under
//! `jobbyfy`; EnvFilter matches both by prefix, so `--log-level debug` turns
//! them up without flooding the output with hyper and rustls.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// Overrides the directives derived from `--log-level`.
const FILTER_ENV: &str = "JOBBYFY_LOG_FILTER";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directives(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "info,bridge=debug,jobbyfy=debug",
            LogLevel::Trace => "info,bridge=trace,jobbyfy=trace",
        }
    }

    fn verbose(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("log file path {0:?} has no file name")]
    NoFileName(PathBuf),
    #[error("failed to open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: tracing_appender::rolling::InitError,
    },
    #[error("failed to install logger: {0}")]
    Install(String),
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered lines are lost on exit.
pub fn init(level: LogLevel, file: Option<&Path>) -> Result<WorkerGuard, InitError> {
    let filter = match std::env::var(FILTER_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new(level.directives()),
    };

    let (writer, guard) = match file {
        Some(path) => tracing_appender::non_blocking(open_log_file(path)?),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(level.verbose())
        .with_ansi(file.is_none())
        .with_writer(writer)
        .try_init()
        .map_err(|err| InitError::Install(err.to_string()))?;
    Ok(guard)
}

/// Appends to `path` across runs; the file is never rotated.
fn open_log_file(path: &Path) -> Result<RollingFileAppender, InitError> {
    let name = path
        .file_name()
        .ok_or_else(|| InitError::NoFileName(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|source| InitError::Open {
            path: path.to_path_buf(),
            source,
        })
}
