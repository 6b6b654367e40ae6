//! Benchmark run configuration.

use core::time::Duration;
use std::path::PathBuf;

use derive_more::derive::From;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_TRIALS: usize = 50_000;
pub const DEFAULT_PAYLOAD_SIZE: usize = 1024;
pub const DEFAULT_THRESHOLDS_US: [f64; 3] = [5.0, 2.0, 1.0];

/// Most samples a results table can address.
#[allow(clippy::cast_sign_loss)]
pub const MAX_SAMPLES: usize = isize::MAX as usize / core::mem::size_of::<f64>();

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    InvalidPath(PathBuf),

    #[from(ignore)]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IOError(err) => Some(err),
            ConfigError::DeserializationFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid `{field}`: {reason}")
            }
            ConfigError::InvalidPath(path) => {
                write!(f, "config file not found: {}", path.display())
            }
            _ => write!(f, "{self:?}"),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration for a rendezvous benchmark run.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// num_workers = 4
/// num_trials = 1000
/// seed = 7
/// pop_timeout_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Number of parallel workers
    num_workers: usize,
    /// Trials per worker
    num_trials: usize,
    /// Elements per payload
    payload_size: usize,
    /// Base seed for the per-worker generators, entropy when absent
    seed: Option<u64>,
    /// Optional bound on pending payloads, unbounded when absent
    capacity: Option<usize>,
    /// Optional bound on each wait for a payload, unbounded when absent
    pop_timeout_ms: Option<u64>,
    /// Keep each worker's last sent and received payload
    retain_payloads: bool,
    /// Count channel traffic and its pending high-water mark; adds atomic
    /// operations to every timed critical section
    track_occupancy: bool,
    /// Latency thresholds reported by the summary, in microseconds
    thresholds_us: Vec<f64>,
}

impl BenchConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - `num_workers`: 10
    /// - `num_trials`: 50000
    /// - `payload_size`: 1024
    /// - `thresholds_us`: 5, 2 and 1
    /// - no seed, capacity or pop timeout; payloads are not retained and
    ///   occupancy is not tracked
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_workers: DEFAULT_WORKERS,
            num_trials: DEFAULT_TRIALS,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            seed: None,
            capacity: None,
            pop_timeout_ms: None,
            retain_payloads: false,
            track_occupancy: false,
            thresholds_us: DEFAULT_THRESHOLDS_US.to_vec(),
        }
    }

    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.num_workers = count;
        self
    }

    #[must_use]
    pub fn trials(mut self, count: usize) -> Self {
        self.num_trials = count;
        self
    }

    #[must_use]
    pub fn payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }

    /// Seeds worker `i`'s generator with `seed + i`.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Bounds the pending set; pushes wait while it is full.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Aborts the run if any single wait for a payload exceeds `timeout`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout_ms = Some(timeout.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    #[must_use]
    pub fn retain_payloads(mut self, retain: bool) -> Self {
        self.retain_payloads = retain;
        self
    }

    /// Installs the occupancy probe on the run's channel.
    #[must_use]
    pub fn track_occupancy(mut self, track: bool) -> Self {
        self.track_occupancy = track;
        self
    }

    #[must_use]
    pub fn thresholds(mut self, thresholds_us: impl Into<Vec<f64>>) -> Self {
        self.thresholds_us = thresholds_us.into();
        self
    }

    #[must_use]
    pub const fn get_workers(&self) -> usize {
        self.num_workers
    }

    #[must_use]
    pub const fn get_trials(&self) -> usize {
        self.num_trials
    }

    #[must_use]
    pub const fn get_payload_size(&self) -> usize {
        self.payload_size
    }

    #[must_use]
    pub const fn get_seed(&self) -> Option<u64> {
        self.seed
    }

    #[must_use]
    pub const fn get_capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[must_use]
    pub fn get_pop_timeout(&self) -> Option<Duration> {
        self.pop_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub const fn get_retain_payloads(&self) -> bool {
        self.retain_payloads
    }

    #[must_use]
    pub const fn get_track_occupancy(&self) -> bool {
        self.track_occupancy
    }

    #[must_use]
    pub fn get_thresholds(&self) -> &[f64] {
        &self.thresholds_us
    }

    /// Total number of latency samples a run produces.
    #[must_use]
    pub const fn total_samples(&self) -> usize {
        self.num_workers.saturating_mul(self.num_trials)
    }

    /// Checks the configuration can drive a run.
    ///
    /// Zero trials is valid and yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_workers",
                reason: "at least one worker is required",
            });
        }
        if self.payload_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "payload_size",
                reason: "payloads need at least one element",
            });
        }
        if self.capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "capacity",
                reason: "a bounded channel needs room for at least one payload",
            });
        }
        if self.pop_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "pop_timeout_ms",
                reason: "a zero timeout fails every wait",
            });
        }
        if self
            .thresholds_us
            .iter()
            .any(|threshold| !threshold.is_finite() || *threshold < 0.0)
        {
            return Err(ConfigError::InvalidValue {
                field: "thresholds_us",
                reason: "thresholds must be finite and non-negative",
            });
        }
        if self
            .num_workers
            .checked_mul(self.num_trials)
            .is_none_or(|samples| samples > MAX_SAMPLES)
        {
            return Err(ConfigError::InvalidValue {
                field: "num_trials",
                reason: "num_workers * num_trials samples do not fit in one table",
            });
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a [`BenchConfig`] from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPath`] if `target` is not a file, or the
/// read/parse error otherwise. The result is not validated.
pub fn from_path<V>(target: V) -> ConfigResult<BenchConfig>
where
    V: Into<PathBuf>,
{
    let target_path = target.into();
    if !target_path.is_file() {
        return Err(ConfigError::InvalidPath(target_path));
    }
    let config_content = std::fs::read_to_string(target_path)?;
    from_toml_str(&config_content)
}

/// Parses a [`BenchConfig`] from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::DeserializationFailed`] on malformed input or
/// unknown keys.
pub fn from_toml_str(content: &str) -> ConfigResult<BenchConfig> {
    let config_obj: BenchConfig = toml::from_str(content)?;
    Ok(config_obj)
}
