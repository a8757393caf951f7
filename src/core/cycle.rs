//! Present-card cycle parameters and device timing
//!
//! The robot gives no completion signal for a running `presentCard`, so the
//! controller waits a duration computed from the parameters. The constants in
//! [`TimingConfig`] are empirical and tunable, not derived from firmware.

use super::repl::Command;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-repetition allowance on top of the press and retract durations
pub const DEFAULT_CYCLE_MARGIN_MS: u64 = 1000;

/// Settle time after a soft reset before the prompt is read
pub const DEFAULT_RESET_SETTLE_MS: u64 = 4000;

/// Parameters of one `presentCard` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTestParameters {
    /// Card slot index
    pub slot: u8,
    /// Number of repetitions
    pub num: u32,
    /// Press duration in milliseconds
    pub press_ms: u64,
    /// Retract duration in milliseconds
    pub retract_ms: u64,
}

impl CycleTestParameters {
    /// Create parameters; both durations are always explicit
    pub fn new(slot: u8, num: u32, press_ms: u64, retract_ms: u64) -> Self {
        Self {
            slot,
            num,
            press_ms,
            retract_ms,
        }
    }

    /// The interpreter statement that runs the cycle
    pub fn command(&self) -> Command {
        // Integers only, always a valid single ASCII line.
        Command::new_unchecked(format!(
            "rob.presentCard({}, {}, {}, {})",
            self.slot, self.num, self.press_ms, self.retract_ms
        ))
    }

    /// Expected run time on the device
    ///
    /// `num * (press + retract + margin)` milliseconds.
    pub fn total_duration(&self, timing: &TimingConfig) -> Duration {
        let per_cycle = self
            .press_ms
            .saturating_add(self.retract_ms)
            .saturating_add(timing.cycle_margin_ms);
        Duration::from_millis(u64::from(self.num).saturating_mul(per_cycle))
    }
}

/// Unattended loop of cycle tests over several slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurabilityPlan {
    /// Slots visited in order every round
    pub slots: Vec<u8>,
    /// Repetitions per cycle test
    pub num: u32,
    /// Press duration in milliseconds
    pub press_ms: u64,
    /// Retract duration in milliseconds
    pub retract_ms: u64,
    /// Pause after each cycle test
    pub pause: Duration,
    /// Number of rounds, `None` runs until cancelled
    pub rounds: Option<u32>,
}

impl DurabilityPlan {
    /// Parameters of the cycle test for `slot`
    pub fn parameters(&self, slot: u8) -> CycleTestParameters {
        CycleTestParameters::new(slot, self.num, self.press_ms, self.retract_ms)
    }
}

/// Tunable wait times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Allowance added to every repetition, in milliseconds
    pub cycle_margin_ms: u64,
    /// Wait after a soft reset, in milliseconds
    pub reset_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_margin_ms: DEFAULT_CYCLE_MARGIN_MS,
            reset_settle_ms: DEFAULT_RESET_SETTLE_MS,
        }
    }
}

impl TimingConfig {
    /// Reset settle time
    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }
}
