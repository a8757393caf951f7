//! Console capture logging
//!
//! Captured device output is stamped as [`LogLine`]s, collected in a
//! [`PendingLines`] buffer and handed by value to a [`LineSink`]. The file
//! sink appends one line per captured line to the session's log file.

use super::error::{Result, RobotError};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Timestamp prefix format of a log line
pub const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format embedded in log file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y_%m_%d__%H_%M_%S";

/// Log file name prefix
pub const LOG_FILE_PREFIX: &str = "cycle_test_logs";

/// One captured line of device output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Capture time
    pub timestamp: DateTime<Local>,
    /// Raw line text without terminator
    pub text: String,
}

impl LogLine {
    /// Stamp `text` with the current time
    pub fn now(text: impl Into<String>) -> Self {
        Self::at(Local::now(), text)
    }

    /// Stamp `text` with an explicit time
    pub fn at(timestamp: DateTime<Local>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format(LINE_TIMESTAMP_FORMAT),
            self.text
        )
    }
}

/// Destination for captured lines
pub trait LineSink: Send {
    /// Append `lines` in order, returning how many were written
    fn append(&mut self, lines: Vec<LogLine>) -> Result<usize>;
}

/// Lines captured but not yet written
#[derive(Debug, Default)]
pub struct PendingLines {
    lines: Vec<LogLine>,
}

impl PendingLines {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line
    pub fn push(&mut self, line: LogLine) {
        self.lines.push(line);
    }

    /// Number of queued lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Move every queued line into `sink`
    ///
    /// The buffer is empty afterwards. Flushing an empty buffer does not
    /// touch the sink.
    pub fn flush(&mut self, sink: &mut dyn LineSink) -> Result<usize> {
        if self.lines.is_empty() {
            return Ok(0);
        }
        sink.append(std::mem::take(&mut self.lines))
    }
}

/// Append-only log file for one session
pub struct LogSink {
    path: PathBuf,
    file: BufWriter<File>,
    lines_written: usize,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("path", &self.path)
            .field("lines_written", &self.lines_written)
            .finish_non_exhaustive()
    }
}

impl LogSink {
    /// Open `path` for appending, creating it and its directory if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let log_file_error = |source| RobotError::LogFile {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(log_file_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(log_file_error)?;

        Ok(Self {
            file: BufWriter::new(file),
            path,
            lines_written: 0,
        })
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written through this sink
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }
}

impl LineSink for LogSink {
    fn append(&mut self, lines: Vec<LogLine>) -> Result<usize> {
        let count = lines.len();
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(self.file, "{line}"))
            .and_then(|()| self.file.flush());

        result.map_err(|source| RobotError::LogFile {
            path: self.path.clone(),
            source,
        })?;

        self.lines_written += count;
        Ok(count)
    }
}

/// In-memory sink, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<LogLine>>>,
    appends: Arc<Mutex<usize>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines received so far
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// Number of `append` calls
    pub fn appends(&self) -> usize {
        *self.appends.lock()
    }
}

impl LineSink for MemorySink {
    fn append(&mut self, lines: Vec<LogLine>) -> Result<usize> {
        let count = lines.len();
        self.lines.lock().extend(lines);
        *self.appends.lock() += 1;
        Ok(count)
    }
}

/// One test run and the log file it writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    started_at: DateTime<Local>,
    log_path: PathBuf,
}

impl Session {
    /// Start a session now, logging under `log_dir`
    pub fn start(log_dir: &Path) -> Self {
        Self::started_at(log_dir, Local::now())
    }

    /// Session with an explicit start time
    pub fn started_at(log_dir: &Path, started_at: DateTime<Local>) -> Self {
        let log_path = log_dir.join(log_filename(started_at));
        Self {
            started_at,
            log_path,
        }
    }

    /// Start time
    pub fn started(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Target log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Open the session's log file
    pub fn open_sink(&self) -> Result<LogSink> {
        LogSink::open(&self.log_path)
    }
}

/// Log file name for a session started at `started_at`
pub fn log_filename(started_at: DateTime<Local>) -> String {
    format!(
        "{}_{}.txt",
        LOG_FILE_PREFIX,
        started_at.format(FILE_TIMESTAMP_FORMAT)
    )
}
