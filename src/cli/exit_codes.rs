//! CLI Exit Codes
//!
//! Exit codes let a supervising script tell why an unattended run stopped.

use crate::core::error::RobotError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// I/O failure on an open connection
    pub const IO_ERROR: u8 = 4;

    /// Log file could not be written
    pub const LOG_FILE_ERROR: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error
    pub const PROTOCOL_ERROR: u8 = 9;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Device not found
    pub const DEVICE_NOT_FOUND: u8 = 12;

    /// Device busy
    pub const DEVICE_BUSY: u8 = 13;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg.as_str()),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&RobotError> for CliResult {
    fn from(err: &RobotError) -> Self {
        Self::Error(exit_code_for(err), err.to_string())
    }
}

impl From<anyhow::Error> for CliResult {
    fn from(err: anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<RobotError>())
            .map_or(ExitCodes::ERROR, exit_code_for);
        Self::Error(code, format!("{err:#}"))
    }
}

/// Exit code for a robot error
pub fn exit_code_for(err: &RobotError) -> u8 {
    match err {
        RobotError::DeviceNotFound(_) => ExitCodes::DEVICE_NOT_FOUND,
        RobotError::Connection { .. } => ExitCodes::CONNECTION_FAILED,
        RobotError::Io(_) => ExitCodes::IO_ERROR,
        RobotError::InvalidUtf8(_) => ExitCodes::PROTOCOL_ERROR,
        RobotError::InvalidCommand(_) => ExitCodes::INVALID_ARGS,
        RobotError::ChannelBusy { .. } | RobotError::ReaderAlreadyRunning => ExitCodes::DEVICE_BUSY,
        RobotError::ReaderTask(_) => ExitCodes::INTERNAL_ERROR,
        RobotError::LogFile { .. } => ExitCodes::LOG_FILE_ERROR,
        RobotError::Config(_) => ExitCodes::CONFIG_ERROR,
        RobotError::Cancelled => ExitCodes::CANCELLED,
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Serial I/O error",
        6 => "Log file error",
        8 => "Configuration error",
        9 => "Protocol error",
        11 => "Operation cancelled",
        12 => "Device not found",
        13 => "Device busy",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 6, 8, 9, 11, 12, 13, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arbitration::ChannelMode;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_robot_error_codes() {
        let err = RobotError::DeviceNotFound("CH340".to_string());
        let result = CliResult::from(&err);
        assert_eq!(result.code(), ExitCodes::DEVICE_NOT_FOUND);
        assert_eq!(
            result.message(),
            Some("Could not find serial device matching \"CH340\"")
        );

        let busy = RobotError::ChannelBusy {
            requested: ChannelMode::Command,
            current: ChannelMode::Streaming,
        };
        assert_eq!(exit_code_for(&busy), ExitCodes::DEVICE_BUSY);
        assert_eq!(exit_code_for(&RobotError::Cancelled), ExitCodes::CANCELLED);
    }

    #[test]
    fn test_from_anyhow_finds_robot_error() {
        let err = anyhow::Error::new(RobotError::Config("bad slots".to_string()))
            .context("loading configuration");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::CONFIG_ERROR);
        assert_eq!(
            result.message(),
            Some("loading configuration: Configuration error: bad slots")
        );
    }

    #[test]
    fn test_unknown_error_is_general() {
        let result = CliResult::from(anyhow::anyhow!("something else"));
        assert_eq!(result.code(), ExitCodes::ERROR);
    }
}
