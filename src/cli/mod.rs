//! CLI Module
//!
//! Provides command-line support functionality:
//! - Exit codes for automation

pub mod exit_codes;

pub use exit_codes::{exit_code_description, exit_code_for, print_exit_codes, CliResult, ExitCodes};
