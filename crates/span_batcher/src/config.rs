//! Configuration for the batch processor.

use crate::error::ConfigError;
use std::time::Duration;

/// Environment variable for [`BatchConfig::max_queue_size`].
pub const ENV_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Environment variable for [`BatchConfig::schedule_delay`].
pub const ENV_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Environment variable for [`BatchConfig::export_timeout`].
pub const ENV_EXPORT_TIMEOUT: &str = "OTEL_BSP_EXPORT_TIMEOUT";
/// Environment variable for [`BatchConfig::max_export_batch_size`].
pub const ENV_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";

/// Configuration for batch processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Ring capacity. Records offered while the ring is full are dropped.
    ///
    /// Default: 2048
    pub max_queue_size: usize,

    /// Interval between two consecutive scheduled exports.
    ///
    /// Default: 5000ms
    pub schedule_delay: Duration,

    /// Upper bound on a single exporter call. Zero means unbounded.
    ///
    /// Default: 30000ms
    pub export_timeout: Duration,

    /// Most records handed to the exporter in one scheduled call.
    /// Must not exceed `max_queue_size`.
    ///
    /// Default: 512
    pub max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            schedule_delay: Duration::from_millis(5000),
            export_timeout: Duration::from_millis(30000),
            max_export_batch_size: 512,
        }
    }
}

impl BatchConfig {
    /// Sets the ring capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the delay between scheduled exports.
    pub fn with_schedule_delay(mut self, delay: Duration) -> Self {
        self.schedule_delay = delay;
        self
    }

    /// Sets the per-export timeout.
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    /// Sets the scheduled batch size.
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.max_export_batch_size = size;
        self
    }

    /// Checks the relationships between fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.max_export_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(ConfigError::BatchExceedsQueue {
                batch: self.max_export_batch_size,
                queue: self.max_queue_size,
            });
        }
        if self.schedule_delay.is_zero() {
            return Err(ConfigError::ZeroScheduleDelay);
        }
        Ok(())
    }

    /// Defaults overridden by the `OTEL_BSP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `OTEL_BSP_*` keys.
    ///
    /// Unset or blank values keep the default. Values that fail to parse
    /// keep the default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = read(ENV_MAX_QUEUE_SIZE) {
            override_with(ENV_MAX_QUEUE_SIZE, &raw, parse_size, &mut config.max_queue_size);
        }
        if let Some(raw) = read(ENV_SCHEDULE_DELAY) {
            override_with(ENV_SCHEDULE_DELAY, &raw, parse_duration, &mut config.schedule_delay);
        }
        if let Some(raw) = read(ENV_EXPORT_TIMEOUT) {
            override_with(ENV_EXPORT_TIMEOUT, &raw, parse_duration, &mut config.export_timeout);
        }
        if let Some(raw) = read(ENV_MAX_EXPORT_BATCH_SIZE) {
            override_with(
                ENV_MAX_EXPORT_BATCH_SIZE,
                &raw,
                parse_size,
                &mut config.max_export_batch_size,
            );
        }

        config
    }
}

fn override_with<T>(key: &str, raw: &str, parse: fn(&str) -> Option<T>, slot: &mut T) {
    match parse(raw.trim()) {
        Some(value) => *slot = value,
        None => tracing::warn!(variable = key, value = raw, "ignoring unparseable value"),
    }
}

fn parse_size(raw: &str) -> Option<usize> {
    raw.parse().ok()
}

/// Parses `<digits>[ns|us|ms|s|m|h]`. A bare number is milliseconds.
pub(crate) fn parse_duration(raw: &str) -> Option<Duration> {
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    let duration = match unit.trim() {
        "ns" => Duration::from_nanos(amount),
        "us" => Duration::from_micros(amount),
        "" | "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60)?),
        "h" => Duration::from_secs(amount.checked_mul(3600)?),
        _ => return None,
    };
    Some(duration)
}
