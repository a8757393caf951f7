//! Scripted serial link for exercising the protocol without hardware.
//!
//! [`MockLink`] records everything written to it and serves reads from an
//! input queue. Responses can be tied to writes, so a test can stand in for
//! the robot's REPL:
//!
//! ```
//! use cardbot_core::core::transport::MockLink;
//!
//! let mock = MockLink::new();
//! // When the client submits this line, echo it and print a prompt.
//! mock.respond_to(b"import source.RobotTester\r", b"import source.RobotTester\r\n>>> ");
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    /// Bytes waiting to be read.
    input: VecDeque<u8>,
    /// Every byte written, in order.
    written: Vec<u8>,
    /// Offset into `written` where the next expectation match may start.
    match_from: usize,
    expectations: VecDeque<Expectation>,
    closed: bool,
}

/// In-memory stand-in for a serial port.
///
/// Clones share state, so a test keeps one handle while the channel owns
/// another. An empty read sleeps for the poll delay and reports
/// `ErrorKind::TimedOut`, like a real port with a read timeout.
#[derive(Debug, Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    poll_delay: Duration,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// Create an open link with no pending input.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            poll_delay: Duration::from_millis(2),
        }
    }

    /// Queue bytes for the reader.
    pub fn push_input(&self, data: &[u8]) {
        self.state.lock().input.extend(data);
    }

    /// Queue `response` once `request` has been written.
    ///
    /// Expectations are consumed in order.
    pub fn respond_to(&self, request: &[u8], response: &[u8]) {
        self.state.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// All bytes written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Written bytes decoded lossily, for assertions.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().written).into_owned()
    }

    /// Number of expectations not yet triggered.
    pub fn pending_expectations(&self) -> usize {
        self.state.lock().expectations.len()
    }

    /// Number of queued input bytes not yet read.
    pub fn unread_input(&self) -> usize {
        self.state.lock().input.len()
    }

    /// Simulate the device disappearing: reads return end-of-stream and
    /// writes fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(0);
            }
            if !state.input.is_empty() {
                let n = buf.len().min(state.input.len());
                for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }

        std::thread::sleep(self.poll_delay);
        Err(io::Error::new(ErrorKind::TimedOut, "no data"))
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "link closed"));
        }
        state.written.extend_from_slice(buf);

        while let Some(expectation) = state.expectations.front() {
            let window = &state.written[state.match_from..];
            let Some(pos) = window
                .windows(expectation.request.len())
                .position(|w| w == expectation.request.as_slice())
            else {
                break;
            };

            let end = state.match_from + pos + expectation.request.len();
            if let Some(expectation) = state.expectations.pop_front() {
                state.input.extend(expectation.response);
            }
            state.match_from = end;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
