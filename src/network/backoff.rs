//! Reconnect delay policy.

use std::time::Duration;

/// First delay after a failed connection attempt.
pub const INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for any delay.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Growth factor applied after every wait.
pub const GROWTH: f64 = 1.8;

/// Exponential backoff, reset after a successful registration.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    growth: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(MAX_DELAY, GROWTH)
    }
}

impl Backoff {
    pub fn new(max: Duration, growth: f64) -> Self {
        Self {
            current: INITIAL_DELAY.min(max),
            max,
            growth,
        }
    }

    /// The delay the next [`Backoff::next_delay`] call will return.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay to wait now and grow the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.growth).min(self.max);
        delay
    }

    /// Wait for the next delay.
    pub async fn sleep(&mut self) {
        tokio::time::sleep(self.next_delay()).await;
    }

    pub fn reset(&mut self) {
        self.current = INITIAL_DELAY.min(self.max);
    }
}
