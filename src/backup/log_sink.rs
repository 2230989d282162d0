//! Persistent backup log.
//!
//! Every step of a run leaves a `<timestamp> - <message>` line behind. Sinks
//! never hand errors back to the caller: a [`FileLogSink`] that cannot write
//! forwards the record to its fallback sink instead.

use chrono::{DateTime, Local};
use std::fmt::{Display, Formatter};
use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub static LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, derive_more::Display, PartialEq, Eq)]
pub enum LogLevel {
    #[display("INFO")]
    Info,
    #[display("ERROR")]
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new<S: Into<String>>(level: LogLevel, message: S) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - ", self.timestamp.format(LOG_TIME_FORMAT))?;
        match self.level {
            LogLevel::Info => write!(f, "{}", self.message),
            LogLevel::Error => write!(f, "ERROR: {}", self.message),
        }
    }
}

pub trait LogSink {
    fn append(&self, record: &LogRecord);

    fn info<S: Into<String>>(&self, message: S)
    where
        Self: Sized,
    {
        self.append(&LogRecord::new(LogLevel::Info, message))
    }

    fn error<S: Into<String>>(&self, message: S)
    where
        Self: Sized,
    {
        self.append(&LogRecord::new(LogLevel::Error, message))
    }
}

impl<T: LogSink + ?Sized> LogSink for &T {
    fn append(&self, record: &LogRecord) {
        (**self).append(record)
    }
}

impl<T: LogSink + ?Sized> LogSink for Box<T> {
    fn append(&self, record: &LogRecord) {
        (**self).append(record)
    }
}

/// Emits records through `tracing`, which ends up on stderr with the default subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn append(&self, record: &LogRecord) {
        match record.level {
            LogLevel::Info => tracing::info!(target: "backup_log", "{record}"),
            LogLevel::Error => tracing::error!(target: "backup_log", "{record}"),
        }
    }
}

/// Keeps records in process.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, record: &LogRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}

/// Appends records to a text file, one line each.
///
/// The parent directory and the file are created on first write.
#[derive(Debug)]
pub struct FileLogSink<F: LogSink = TracingLogSink> {
    path: PathBuf,
    fallback: F,
}

impl FileLogSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_fallback(path, TracingLogSink)
    }
}

impl<F: LogSink> FileLogSink<F> {
    pub fn with_fallback<P: Into<PathBuf>>(path: P, fallback: F) -> Self {
        Self {
            path: path.into(),
            fallback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &LogRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{record}")
    }
}

impl<F: LogSink> LogSink for FileLogSink<F> {
    fn append(&self, record: &LogRecord) {
        if let Err(e) = self.write_line(record) {
            tracing::warn!("Cannot write backup log {:?}: {}", self.path, e);
            self.fallback.append(record);
        }
    }
}
