//! Configuration for synced_rust

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{TierBand, TierTable};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Remote store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Deadline for any single remote call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Loyalty ledger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Attempts at the conditional balance write before giving up
    #[serde(default = "default_max_grant_attempts")]
    pub max_grant_attempts: u32,

    /// Points per currency unit spent
    #[serde(default = "default_points_per_currency_unit")]
    pub points_per_currency_unit: f64,

    /// Welcome bonus credited at enrollment
    #[serde(default = "default_registration_bonus")]
    pub registration_bonus: u64,

    #[serde(default = "default_birthday_bonus")]
    pub birthday_bonus: u64,

    /// Tier bands, lowest first. The first must start at 0.
    #[serde(default = "TierTable::default_bands")]
    pub tiers: Vec<TierBand>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_grant_attempts() -> u32 {
    5
}

fn default_points_per_currency_unit() -> f64 {
    1.0
}

fn default_registration_bonus() -> u64 {
    100
}

fn default_birthday_bonus() -> u64 {
    200
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_grant_attempts: default_max_grant_attempts(),
            points_per_currency_unit: default_points_per_currency_unit(),
            registration_bonus: default_registration_bonus(),
            birthday_bonus: default_birthday_bonus(),
            tiers: TierTable::default_bands(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LedgerConfig {
    /// The validated tier table.
    pub fn tier_table(&self) -> Result<TierTable, ConfigError> {
        TierTable::new(self.tiers.clone()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Config {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "remote.request_timeout_ms must be positive".into(),
            ));
        }
        if self.ledger.max_grant_attempts == 0 {
            return Err(ConfigError::Invalid(
                "ledger.max_grant_attempts must be at least 1".into(),
            ));
        }
        let rate = self.ledger.points_per_currency_unit;
        if !rate.is_finite() || rate < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "ledger.points_per_currency_unit must be a non-negative number, got {}",
                rate
            )));
        }
        self.ledger.tier_table()?;
        Ok(())
    }
}
