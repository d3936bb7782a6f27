use std::time::Duration;

use rand::Rng;

/// Failures tolerated in memory before a batch is spilled to disk.
const SPILL_THRESHOLD: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Tracks consecutive delivery failures and computes retry delays.
///
/// Delays use full jitter: uniform in `[0, min(base · 2^(n-1), max))`,
/// drawn fresh per failure so concurrent clients don't retry in
/// lockstep.
pub struct BackoffController {
    consecutive_failures: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl BackoffController {
    pub fn new() -> Self {
        Self::with_delays(BASE_DELAY, MAX_DELAY)
    }

    pub fn with_delays(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            base_delay,
            max_delay,
        }
    }

    /// Record a failed attempt and return the delay before the next one.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures += 1;
        let exp = self.consecutive_failures.saturating_sub(1).min(30);
        let ceiling = self
            .base_delay
            .saturating_mul(1 << exp)
            .min(self.max_delay)
            .as_secs_f64();
        if ceiling <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rand::rng().random_range(0.0..ceiling))
    }

    /// Record a successful delivery.
    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Whether the current retry sequence has exhausted its in-memory
    /// budget and the batch should be handed to the disk store.
    pub fn should_spill_to_disk(&self) -> bool {
        self.consecutive_failures >= SPILL_THRESHOLD
    }

    /// Start a fresh retry budget (called after a spill).
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    #[cfg(test)]
    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new()
    }
}
