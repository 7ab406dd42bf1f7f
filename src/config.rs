//! Engine configuration.

use std::time::Duration;

use crate::delivery::BackoffPolicy;

/// Tunables for the delivery engine, sweeper, and worker pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts before a job expires
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Bound on a single transport attempt; exceeding it counts as a
    /// transport error
    pub transport_timeout: Duration,
    /// How long a `sent` job may wait for acknowledgment before it is
    /// treated as failed
    pub ack_timeout: Duration,
    /// Worker lease length; a lapsed lease releases the job to the sweeper
    pub lease_timeout: Duration,
    /// Sweeper tick interval
    pub sweep_interval: Duration,
    /// Max jobs handled per sweep
    pub sweep_batch: u32,
    /// Delivery worker pool size
    pub worker_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            transport_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(900),
            lease_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(30),
            sweep_batch: 100,
            worker_count: 4,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// | Variable                 | Default |
    /// |--------------------------|---------|
    /// | `MAX_DELIVERY_ATTEMPTS`  | `3`     |
    /// | `BASE_RETRY_DELAY_SECS`  | `300`   |
    /// | `MAX_RETRY_DELAY_SECS`   | `3600`  |
    /// | `RETRY_MULTIPLIER`       | `2.0`   |
    /// | `RETRY_JITTER`           | `0.25`  |
    /// | `TRANSPORT_TIMEOUT_SECS` | `30`    |
    /// | `ACK_TIMEOUT_SECS`       | `900`   |
    /// | `LEASE_TIMEOUT_SECS`     | `120`   |
    /// | `SWEEP_INTERVAL_SECS`    | `30`    |
    /// | `SWEEP_BATCH`            | `100`   |
    /// | `DELIVERY_WORKERS`       | `4`     |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_backoff = BackoffPolicy::default();

        Self {
            max_attempts: env_parse("MAX_DELIVERY_ATTEMPTS", defaults.max_attempts),
            backoff: BackoffPolicy::new(
                Duration::from_secs(env_parse(
                    "BASE_RETRY_DELAY_SECS",
                    default_backoff.base_delay.as_secs(),
                )),
                Duration::from_secs(env_parse(
                    "MAX_RETRY_DELAY_SECS",
                    default_backoff.max_delay.as_secs(),
                )),
                env_parse("RETRY_MULTIPLIER", default_backoff.multiplier),
                env_parse("RETRY_JITTER", 0.25),
            ),
            transport_timeout: Duration::from_secs(env_parse(
                "TRANSPORT_TIMEOUT_SECS",
                defaults.transport_timeout.as_secs(),
            )),
            ack_timeout: Duration::from_secs(env_parse(
                "ACK_TIMEOUT_SECS",
                defaults.ack_timeout.as_secs(),
            )),
            lease_timeout: Duration::from_secs(env_parse(
                "LEASE_TIMEOUT_SECS",
                defaults.lease_timeout.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_parse(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            sweep_batch: env_parse("SWEEP_BATCH", defaults.sweep_batch),
            worker_count: env_parse("DELIVERY_WORKERS", defaults.worker_count),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
