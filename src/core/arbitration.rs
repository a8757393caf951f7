//! Channel Arbitration
//!
//! The serial connection has a single byte stream. Two kinds of consumers
//! read from it:
//! - the REPL client, which waits for echoes and prompts (command mode)
//! - the background log reader, which drains every line (streaming mode)
//!
//! Letting both read at once splits the stream between them
//! nondeterministically, so each must hold a [`ChannelLease`] for its mode.
//! A lease is only granted from [`ChannelMode::Idle`]; any other transition is
//! rejected with [`RobotError::ChannelBusy`].

use super::error::{Result, RobotError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Who currently reads from the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Nobody is reading
    #[default]
    Idle,
    /// Synchronous echo/prompt exchange
    Command,
    /// Background reader is draining lines
    Streaming,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Command => write!(f, "command"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Exclusive-access token for one serial connection
#[derive(Debug, Clone, Default)]
pub struct ChannelArbiter {
    mode: Arc<Mutex<ChannelMode>>,
}

impl ChannelArbiter {
    /// Create an arbiter in idle mode
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode
    pub fn mode(&self) -> ChannelMode {
        *self.mode.lock()
    }

    /// Take the channel for `mode`
    ///
    /// Fails if the channel is not idle. The mode returns to idle when the
    /// lease is dropped.
    pub fn acquire(&self, mode: ChannelMode) -> Result<ChannelLease> {
        let mut current = self.mode.lock();
        if *current != ChannelMode::Idle || mode == ChannelMode::Idle {
            return Err(RobotError::ChannelBusy {
                requested: mode,
                current: *current,
            });
        }
        *current = mode;
        tracing::trace!("Serial channel entered {} mode", mode);

        Ok(ChannelLease {
            mode: Arc::clone(&self.mode),
            held: mode,
        })
    }
}

/// Proof of exclusive read access; releases the channel on drop
#[derive(Debug)]
#[must_use = "the channel is released as soon as the lease is dropped"]
pub struct ChannelLease {
    mode: Arc<Mutex<ChannelMode>>,
    held: ChannelMode,
}

impl ChannelLease {
    /// Mode held by this lease
    pub fn mode(&self) -> ChannelMode {
        self.held
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        *self.mode.lock() = ChannelMode::Idle;
        tracing::trace!("Serial channel left {} mode", self.held);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_returns_to_idle() {
        let arbiter = ChannelArbiter::new();
        {
            let lease = arbiter.acquire(ChannelMode::Command).unwrap();
            assert_eq!(lease.mode(), ChannelMode::Command);
            assert_eq!(arbiter.mode(), ChannelMode::Command);
        }
        assert_eq!(arbiter.mode(), ChannelMode::Idle);
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let arbiter = ChannelArbiter::new();
        let _streaming = arbiter.acquire(ChannelMode::Streaming).unwrap();

        let err = arbiter.acquire(ChannelMode::Command).unwrap_err();
        assert!(matches!(
            err,
            RobotError::ChannelBusy {
                requested: ChannelMode::Command,
                current: ChannelMode::Streaming,
            }
        ));
        assert!(arbiter.acquire(ChannelMode::Streaming).is_err());
    }

    #[test]
    fn test_idle_is_not_a_lease() {
        let arbiter = ChannelArbiter::new();
        assert!(arbiter.acquire(ChannelMode::Idle).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let arbiter = ChannelArbiter::new();
        let other = arbiter.clone();
        let _lease = arbiter.acquire(ChannelMode::Command).unwrap();
        assert_eq!(other.mode(), ChannelMode::Command);
    }
}
