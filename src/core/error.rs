//! Error types shared by the serial, REPL and orchestration layers
//!
//! Soft read timeouts are deliberately absent: a read that runs out of time
//! returns whatever it collected and the caller treats that as "no data yet".

use super::arbitration::ChannelMode;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the core
pub type Result<T, E = RobotError> = std::result::Result<T, E>;

/// Robot session error types
#[derive(Error, Debug)]
pub enum RobotError {
    /// No serial port matched the device description
    #[error("Could not find serial device matching \"{0}\"")]
    DeviceNotFound(String),

    /// The serial port exists but could not be opened
    #[error("Failed to open {port}: {source}")]
    Connection {
        /// Port name
        port: String,
        /// Underlying serialport error
        #[source]
        source: serialport::Error,
    },

    /// Read or write failure mid-session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device output was not valid UTF-8
    #[error("Device sent invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Command text cannot be sent as a single REPL line
    #[error("Invalid command {0:?}: must be a single line of ASCII text")]
    InvalidCommand(String),

    /// Another context owns the channel
    #[error("Serial channel busy: {requested} requested while in {current} mode")]
    ChannelBusy {
        /// Mode the caller asked for
        requested: ChannelMode,
        /// Mode currently holding the channel
        current: ChannelMode,
    },

    /// `start()` called on a running reader
    #[error("Background log reader is already running")]
    ReaderAlreadyRunning,

    /// The background or blocking task could not be joined
    #[error("Background task failed: {0}")]
    ReaderTask(#[from] tokio::task::JoinError),

    /// Log file could not be created or written
    #[error("Log file {path}: {source}")]
    LogFile {
        /// Log file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation interrupted by shutdown request
    #[error("Operation cancelled")]
    Cancelled,
}
