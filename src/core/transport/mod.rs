//! Transport layer for the robot's serial console
//!
//! Provides:
//! - [`SerialLink`], the byte-stream seam (a real port or [`MockLink`])
//! - [`SerialChannel`], blocking line/delimiter reads with a soft timeout
//! - Port discovery by USB description

mod channel;
mod mock;
mod serial;

pub use channel::{SerialChannel, POLL_INTERVAL};
pub use mock::MockLink;
pub use serial::{discover, find_port, list_ports, port_description, select_port, SerialConfig};

use std::io::{Read, Write};

/// Default REPL baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default soft read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Raw bidirectional byte stream underneath a [`SerialChannel`]
///
/// Reads are expected to block for at most a short poll interval and report
/// an empty poll as `ErrorKind::TimedOut`, the way `serialport` does.
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLink for T {}
