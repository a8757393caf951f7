//! Core module containing the robot control functionality
//!
//! This module provides:
//! - Transport layer over the robot's serial console
//! - Channel arbitration between command and streaming readers
//! - REPL client (echo wait, prompt drain, interrupts)
//! - Background console logger with timestamped, append-only log files
//! - Cycle test parameters, timing table and orchestration

pub mod arbitration;
pub mod cycle;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod reader;
pub mod repl;
pub mod transport;
