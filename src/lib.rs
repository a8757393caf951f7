//! # Cardbot Core Library
//!
//! Drives a card-presentation robot through the interpreter on its serial
//! console and records the console output while durability cycles run.
//!
//! ## Features
//!
//! - Serial discovery by USB description
//! - REPL command/echo/prompt protocol with soft read timeouts
//! - Background console capture to timestamped log files
//! - Exclusive channel modes so command and streaming reads never interleave
//! - Present-card cycle tests and unattended durability loops
//! - CLI with exit codes
//!
//! ## Example
//!
//! ```rust,no_run
//! use cardbot_core::{CommanderConfig, CycleTestParameters, RobotCommander, SerialConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let port = cardbot_core::discover("CH340")?;
//!     let serial = SerialConfig::new(&port, 115200);
//!     let config = CommanderConfig::new("logs");
//!     let mut robot = RobotCommander::connect(serial, config, CancellationToken::new()).await?;
//!
//!     robot
//!         .present_card_cycle_test(CycleTestParameters::new(0, 10, 1500, 2000))
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{exit_code_description, exit_code_for, print_exit_codes, CliResult, ExitCodes};
pub use crate::config::RobotConfig;
pub use crate::core::arbitration::{ChannelArbiter, ChannelLease, ChannelMode};
pub use crate::core::cycle::{CycleTestParameters, DurabilityPlan, TimingConfig};
pub use crate::core::error::{Result, RobotError};
pub use crate::core::logger::{LineSink, LogLine, LogSink, MemorySink, PendingLines, Session};
pub use crate::core::orchestrator::{CommanderConfig, DurabilitySummary, RobotCommander};
pub use crate::core::reader::{BackgroundLogReader, ReaderReport};
pub use crate::core::repl::{decode_prompt_output, Command, Interrupt, ReplClient};
pub use crate::core::transport::{discover, list_ports, MockLink, SerialChannel, SerialConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
