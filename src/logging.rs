//! Log sinks: `error.log` (never rotated), daily `info.<date>.log` and an
//! optional console mirror for verbose runs.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

use crate::error::LogPathError;

pub const LOGGING_DISABLED: &str = "Logging disabled";
/// Daily info files kept on disk
pub const INFO_RETENTION_DAYS: usize = 14;

const WRITE_CHECK_FILE: &str = ".smart_meter_write_check";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `None` disables file logging
    pub dir: Option<PathBuf>,
    /// Mirror everything down to DEBUG on stdout
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingStatus {
    Disabled,
    Enabled(PathBuf),
}

/// Keeps the non-blocking file writers flushing until dropped.
pub struct LoggingHandle {
    pub status: LoggingStatus,
    _guards: Vec<WorkerGuard>,
}

/// Writers for each sink, `None` leaves the sink out
#[derive(Default)]
pub struct LogWriters {
    pub error: Option<BoxMakeWriter>,
    pub info: Option<BoxMakeWriter>,
    pub console: Option<BoxMakeWriter>,
}

/// Checks that `path` is an existing, writable directory
pub fn validate_log_dir(path: &Path) -> Result<(), LogPathError> {
    let metadata = fs::metadata(path).map_err(|_| LogPathError::NotFound(path.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(LogPathError::NotAccessible {
            path: path.to_path_buf(),
            reason: "not a directory",
        });
    }
    if metadata.permissions().readonly() {
        return Err(LogPathError::NotAccessible {
            path: path.to_path_buf(),
            reason: "directory is read-only",
        });
    }

    let marker = path.join(WRITE_CHECK_FILE);
    fs::write(&marker, b"").map_err(|_| LogPathError::NotAccessible {
        path: path.to_path_buf(),
        reason: "directory is not writable",
    })?;
    let _ = fs::remove_file(&marker);
    Ok(())
}

/// Layers every configured writer onto a fresh registry
pub fn subscriber(writers: LogWriters) -> impl Subscriber + Send + Sync {
    let error = writers.error.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(LevelFilter::ERROR)
    });
    let info = writers.info.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(LevelFilter::INFO)
    });
    let console = writers
        .console
        .map(|writer| fmt::layer().with_writer(writer).with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(error)
        .with(info)
        .with(console)
}

/// Validates the log directory and builds the subscriber without installing it
pub fn build(
    config: &LoggingConfig,
) -> Result<(LoggingHandle, impl Subscriber + Send + Sync), LogPathError> {
    let mut writers = LogWriters::default();
    let mut guards = Vec::new();

    let status = match &config.dir {
        Some(dir) => {
            validate_log_dir(dir)?;

            let error_file = file_appender(dir, Rotation::NEVER, "error", None)?;
            let (error, guard) = tracing_appender::non_blocking(error_file);
            guards.push(guard);
            writers.error = Some(BoxMakeWriter::new(error));

            let info_file =
                file_appender(dir, Rotation::DAILY, "info", Some(INFO_RETENTION_DAYS))?;
            let (info, guard) = tracing_appender::non_blocking(info_file);
            guards.push(guard);
            writers.info = Some(BoxMakeWriter::new(info));

            LoggingStatus::Enabled(dir.clone())
        }
        None => LoggingStatus::Disabled,
    };
    if config.verbose {
        writers.console = Some(BoxMakeWriter::new(std::io::stdout));
    }

    Ok((
        LoggingHandle {
            status,
            _guards: guards,
        },
        subscriber(writers),
    ))
}

/// Installs the process-wide subscriber
pub fn init(config: &LoggingConfig) -> anyhow::Result<LoggingHandle> {
    let (handle, subscriber) = build(config)?;
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;
    Ok(handle)
}

fn file_appender(
    dir: &Path,
    rotation: Rotation,
    prefix: &str,
    max_files: Option<usize>,
) -> Result<RollingFileAppender, LogPathError> {
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log");
    if let Some(max_files) = max_files {
        builder = builder.max_log_files(max_files);
    }
    builder.build(dir).map_err(|e| LogPathError::Sink {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })
}
