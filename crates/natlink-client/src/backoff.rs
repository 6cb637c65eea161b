//! Reconnect backoff derived from consecutive connect failures

use std::time::Duration;
use tracing::debug;

/// Delay added per consecutive failure.
const STEP: Duration = Duration::from_millis(100);

/// Ceiling on the reconnect delay.
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Counts consecutive connect failures against the relay and derives the
/// delay before the next reconnect attempt: zero while no failure has been
/// observed, then 100ms per failure, capped at 10 seconds. Any successful
/// connect resets the counter.
#[derive(Debug, Default)]
pub struct FailureCounter {
    count: u32,
}

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one connect failure and return the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.count += 1;
        self.count
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        if self.count != 0 {
            debug!(failures = self.count, "resetting reconnect backoff");
        }
        self.count = 0;
    }

    /// Current consecutive-failure count.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Delay before the next reconnect attempt at the current count.
    pub fn delay(&self) -> Duration {
        delay_for(self.count)
    }
}

/// `min(count * 100ms, 10s)`
pub fn delay_for(count: u32) -> Duration {
    STEP.checked_mul(count).map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
}
