//! Engine configuration.
//!
//! ## Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PAP_MAX_CLOCK_SKEW_SECS` | 300 |
//! | `PAP_REPLAY_WINDOW_SECS` | same as skew |
//! | `PAP_REPLAY_GC_INTERVAL_SECS` | 10 |
//! | `PAP_MAX_REPLAY_ENTRIES` | 100000 |
//! | `PAP_EXCHANGE_TTL_SECS` | 300 |
//! | `PAP_PING_TIMEOUT_SECS` | 30 |
//! | `PAP_TOMBSTONE_TTL_SECS` | 600 |

use chrono::{DateTime, TimeDelta, Utc};
use pap_types::SignatureAlgorithm;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default maximum clock skew in seconds.
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Upper bound accepted for any configured duration (one week).
pub const MAX_CONFIGURED_SECS: u64 = 7 * 24 * 60 * 60;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("{name} exceeds the maximum of {MAX_CONFIGURED_SECS}s")]
    TooLarge { name: &'static str },

    #[error("replay window ({window:?}) is shorter than the clock skew ({skew:?})")]
    ReplayWindowTooShort { window: Duration, skew: Duration },

    #[error("no signature algorithms enabled")]
    NoAlgorithms,

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Freshness window is `[now - skew, now + skew]`.
    pub max_clock_skew: Duration,
    /// How long a nonce is remembered after its `issuedAt`.
    pub replay_window: Duration,
    /// Minimum interval between opportunistic replay-guard sweeps.
    pub replay_gc_interval: Duration,
    /// Entry count that forces a replay-guard sweep.
    pub max_replay_entries: usize,
    /// Deadline for `expectReply` exchanges that carry none.
    pub default_exchange_ttl: Duration,
    /// Deadline of the exchange a `ping` opens.
    pub ping_timeout: Duration,
    /// How long retired correlation ids are remembered.
    pub tombstone_ttl: Duration,
    /// Minimum interval between eviction passes run while processing.
    pub housekeeping_interval: Duration,
    pub supported_algorithms: Vec<SignatureAlgorithm>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let skew = Duration::from_secs(DEFAULT_MAX_CLOCK_SKEW_SECS);
        Self {
            max_clock_skew: skew,
            replay_window: skew,
            replay_gc_interval: Duration::from_secs(10),
            max_replay_entries: 100_000,
            default_exchange_ttl: Duration::from_secs(300),
            ping_timeout: Duration::from_secs(30),
            tombstone_ttl: Duration::from_secs(600),
            housekeeping_interval: Duration::from_secs(10),
            supported_algorithms: SignatureAlgorithm::known(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PAP_*` environment variables, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(secs) = env_secs("PAP_MAX_CLOCK_SKEW_SECS")? {
            config.max_clock_skew = secs;
            config.replay_window = secs;
        }
        if let Some(secs) = env_secs("PAP_REPLAY_WINDOW_SECS")? {
            config.replay_window = secs;
        }
        if let Some(secs) = env_secs("PAP_REPLAY_GC_INTERVAL_SECS")? {
            config.replay_gc_interval = secs;
        }
        if let Some(value) = env_parse::<usize>("PAP_MAX_REPLAY_ENTRIES")? {
            config.max_replay_entries = value;
        }
        if let Some(secs) = env_secs("PAP_EXCHANGE_TTL_SECS")? {
            config.default_exchange_ttl = secs;
        }
        if let Some(secs) = env_secs("PAP_PING_TIMEOUT_SECS")? {
            config.ping_timeout = secs;
        }
        if let Some(secs) = env_secs("PAP_TOMBSTONE_TTL_SECS")? {
            config.tombstone_ttl = secs;
        }
        if let Some(secs) = env_secs("PAP_HOUSEKEEPING_INTERVAL_SECS")? {
            config.housekeeping_interval = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("max_clock_skew", self.max_clock_skew),
            ("replay_window", self.replay_window),
            ("replay_gc_interval", self.replay_gc_interval),
            ("default_exchange_ttl", self.default_exchange_ttl),
            ("ping_timeout", self.ping_timeout),
            ("tombstone_ttl", self.tombstone_ttl),
            ("housekeeping_interval", self.housekeeping_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::Zero { name });
            }
            if value.as_secs() > MAX_CONFIGURED_SECS {
                return Err(ConfigError::TooLarge { name });
            }
        }
        if self.max_replay_entries == 0 {
            return Err(ConfigError::Zero {
                name: "max_replay_entries",
            });
        }
        if self.replay_window < self.max_clock_skew {
            return Err(ConfigError::ReplayWindowTooShort {
                window: self.replay_window,
                skew: self.max_clock_skew,
            });
        }
        if self.supported_algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        Ok(())
    }

    #[must_use]
    pub fn supports(&self, algorithm: &SignatureAlgorithm) -> bool {
        !matches!(algorithm, SignatureAlgorithm::Other(_))
            && self.supported_algorithms.contains(algorithm)
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

fn env_secs(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(var)?.map(Duration::from_secs))
}

/// Convert a configured duration for timestamp arithmetic.
pub(crate) fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// `at + duration`, saturating at the maximum representable time.
pub(crate) fn add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time from `now` until `at`, zero if `at` has passed.
pub(crate) fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}
