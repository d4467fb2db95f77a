//! Engine Configuration
//!
//! Phase durations and engine tunables, read from the environment with
//! defaults for anything unset.

use std::time::Duration;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Default planning window.
pub const DEFAULT_PLANNING_SECS: u64 = 300;
/// Default resolve window.
pub const DEFAULT_RESOLVE_SECS: u64 = 10;
/// Default commit window.
pub const DEFAULT_COMMIT_SECS: u64 = 15;
/// Default delay before retrying a failed transition.
pub const DEFAULT_RETRY_SECS: u64 = 5;
/// Resolution cost given to provinces created on first reference.
pub const DEFAULT_RESOLUTION_COST: u32 = 1;

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but does not parse.
    #[error("{var}: cannot parse {value:?}")]
    Invalid {
        /// Environment variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Phase durations and the retry delay must be non-zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Turn engine settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long planning stays open without every country ready.
    pub planning_duration: Duration,
    /// How long the resolve phase lasts before commit.
    pub resolve_duration: Duration,
    /// How long committed results stay visible before the next turn.
    pub commit_duration: Duration,
    /// Delay before a failed transition is attempted again.
    pub retry_delay: Duration,
    /// Resolution cost of lazily created provinces.
    pub default_resolution_cost: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            planning_duration: Duration::from_secs(DEFAULT_PLANNING_SECS),
            resolve_duration: Duration::from_secs(DEFAULT_RESOLVE_SECS),
            commit_duration: Duration::from_secs(DEFAULT_COMMIT_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_SECS),
            default_resolution_cost: DEFAULT_RESOLUTION_COST,
        }
    }
}

impl EngineConfig {
    /// Read `WEGO_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                Some(raw) => raw.trim().parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::Invalid { var, value: raw }),
                None => Ok(default),
            }
        };

        let config = Self {
            planning_duration: secs("WEGO_PLANNING_SECS", defaults.planning_duration)?,
            resolve_duration: secs("WEGO_RESOLVE_SECS", defaults.resolve_duration)?,
            commit_duration: secs("WEGO_COMMIT_SECS", defaults.commit_duration)?,
            retry_delay: secs("WEGO_RETRY_SECS", defaults.retry_delay)?,
            default_resolution_cost: match lookup("WEGO_RESOLUTION_COST") {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "WEGO_RESOLUTION_COST",
                    value: raw,
                })?,
                None => defaults.default_resolution_cost,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero-length phases and a zero retry delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planning_duration.is_zero() {
            return Err(ConfigError::Zero("planning_duration"));
        }
        if self.commit_duration.is_zero() {
            return Err(ConfigError::Zero("commit_duration"));
        }
        if self.retry_delay.is_zero() {
            return Err(ConfigError::Zero("retry_delay"));
        }
        Ok(())
    }
}

/// `now + duration`, saturating far in the future instead of overflowing.
pub fn deadline_after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
