//! Exponential backoff scheduling for delivery retries.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;

/// Capped exponential backoff with bounded jitter.
///
/// The jitter fraction is clamped to 0.3: below 1/3, consecutive delays
/// remain strictly increasing until the cap even at worst-case draws,
/// which retry scheduling relies on.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Caps exponential growth
    pub max_delay: Duration,
    /// Growth factor per attempt (e.g. 2.0 = double each time)
    pub multiplier: f64,
    /// Jitter fraction in [0.0, 0.3]; 0.0 disables jitter
    jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(300),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier,
            jitter: jitter.clamp(0.0, 0.3),
        }
    }

    /// Fast policy for tests and local queues.
    pub fn fast() -> Self {
        Self {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.3);
        self
    }

    /// Delay before retry number `attempt` (1-indexed: the first failed
    /// attempt schedules with `attempt = 1`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter > 0.0 {
            let jitter_range = capped * self.jitter;
            let mut rng = rand::thread_rng();
            let offset = rng.gen_range(-jitter_range..=jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Wall-clock due time for the next attempt.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let delay = self.delay_for_attempt(attempt);
        now + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(
            self.max_delay.as_secs() as i64,
        ))
    }
}
