use std::time::Duration;

/// Reconnect pacing for the supervisor: exponential delay with a cap and a
/// bounded number of attempts. Resets after any successful connection.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self
            .initial
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.max);
        self.attempt += 1;
        log::warn!(
            "Reconnect attempt {} of {} in {}s",
            self.attempt,
            self.max_attempts,
            delay.as_secs()
        );
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
