//! Shared serial channel with soft-timeout reads

use super::serial::{open_port, SerialConfig};
use super::SerialLink;
use crate::core::arbitration::{ChannelArbiter, ChannelLease, ChannelMode};
use crate::core::error::Result;
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, MutexGuard};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on a single blocking read against the link.
///
/// The connection lock is held for one poll at a time, so a writer waits at
/// most this long behind a reader.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 256;

struct ChannelInner {
    link: Box<dyn SerialLink>,
    /// Bytes received but not yet handed to a caller
    pending: BytesMut,
}

/// One open serial connection shared by the REPL client and the log reader
///
/// Cloning is cheap; clones share the link, the receive buffer and the
/// [`ChannelArbiter`].
#[derive(Clone)]
pub struct SerialChannel {
    name: Arc<str>,
    inner: Arc<Mutex<ChannelInner>>,
    arbiter: ChannelArbiter,
    read_timeout: Duration,
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("mode", &self.arbiter.mode())
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl SerialChannel {
    /// Wrap an already open link
    pub fn new(name: &str, link: Box<dyn SerialLink>, read_timeout: Duration) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(ChannelInner {
                link,
                pending: BytesMut::with_capacity(4096),
            })),
            arbiter: ChannelArbiter::new(),
            read_timeout,
        }
    }

    /// Open the configured serial port
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = open_port(config)?;
        tracing::info!("Opened {}", config.connection_info());
        Ok(Self::new(&config.port, Box::new(port), config.read_timeout))
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Soft timeout applied to `read_until` and `read_line`
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Access token shared by everyone reading from this channel
    pub fn arbiter(&self) -> &ChannelArbiter {
        &self.arbiter
    }

    /// Take exclusive read access for `mode`
    pub fn lease(&self, mode: ChannelMode) -> Result<ChannelLease> {
        self.arbiter.acquire(mode)
    }

    /// Write and flush `data`
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.link.write_all(data)?;
        inner.link.flush()?;
        tracing::trace!(port = %self.name, tx = %hex::encode(data), "Serial write");
        Ok(())
    }

    /// Read until `delimiter` has been received, returning it inclusive
    ///
    /// When the read timeout elapses first, whatever has accumulated is
    /// returned instead; an empty result means nothing arrived. Bytes that
    /// arrive after the delimiter stay buffered for the next read.
    pub fn read_until(&self, delimiter: &[u8]) -> Result<Bytes> {
        let deadline = Instant::now() + self.read_timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let mut inner = self.inner.lock();

            if let Some(end) = find_delimiter(&inner.pending, delimiter) {
                return Ok(inner.pending.split_to(end).freeze());
            }

            if Instant::now() >= deadline {
                let partial = inner.pending.split().freeze();
                if !partial.is_empty() {
                    tracing::trace!(
                        port = %self.name,
                        len = partial.len(),
                        "Read timed out before delimiter, returning partial data"
                    );
                }
                return Ok(partial);
            }

            match inner.link.read(&mut chunk) {
                Ok(0) => {
                    return Err(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("{} closed", self.name),
                    )
                    .into());
                }
                Ok(n) => {
                    tracing::trace!(port = %self.name, rx = %hex::encode(&chunk[..n]), "Serial read");
                    inner.pending.extend_from_slice(&chunk[..n]);
                }
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }

            MutexGuard::unlock_fair(inner);
        }
    }

    /// Read one line, without its trailing whitespace
    ///
    /// Returns an empty string when the timeout elapses with no data. Invalid
    /// UTF-8 is an error rather than a dropped line.
    pub fn read_line(&self) -> Result<String> {
        let raw = self.read_until(b"\n")?;
        let text = String::from_utf8(raw.to_vec())?;
        Ok(text.trim_end().to_string())
    }
}

/// End offset of the first occurrence of `delimiter`
fn find_delimiter(haystack: &[u8], delimiter: &[u8]) -> Option<usize> {
    if delimiter.is_empty() {
        return Some(0);
    }
    haystack
        .windows(delimiter.len())
        .position(|window| window == delimiter)
        .map(|pos| pos + delimiter.len())
}
