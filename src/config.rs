//! Configuration for storage-preflight.

use crate::error::{Error, Result};
use crate::payment::amount::decimal;
use crate::retry::RetryPolicy;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Epochs per day on the storage chain (30-second epochs).
pub const EPOCHS_PER_DAY: u64 = 2880;

/// Days per billing month used by the service's monthly prices.
pub const DAYS_PER_MONTH: u64 = 30;

/// One-time fee for creating a data set: 0.1 token at 18 decimals.
pub const DATA_SET_CREATION_FEE: u64 = 100_000_000_000_000_000;

/// Symbol of the payment token.
pub const DEFAULT_TOKEN: &str = "USDFC";

/// Constants owned by the storage network, consumed as configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstants {
    /// Chain epochs per day.
    #[serde(default = "default_epochs_per_day")]
    pub epochs_per_day: u64,

    /// One-time data set creation fee, in token base units.
    #[serde(default = "default_creation_fee", with = "decimal")]
    pub data_set_creation_fee: U256,

    /// Payment token symbol.
    #[serde(default = "default_token")]
    pub token: String,
}

/// Storage policy for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Serve stored data through the accelerated delivery network.
    #[serde(default = "default_with_cdn")]
    pub with_cdn: bool,

    /// Days of storage to approve lockup for.
    #[serde(default = "default_persistence_period")]
    pub persistence_period_days: u32,

    /// Minimum days the remaining lockup must last before topping up.
    #[serde(default = "default_min_days_threshold")]
    pub min_days_threshold: f64,
}

/// Readiness retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Upper bound on any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Seed state for the simulated ledger used by offline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedLedgerConfig {
    /// Token balance of the wallet, available for deposits.
    #[serde(default = "default_wallet_balance", with = "decimal")]
    pub wallet_balance: U256,

    /// Funds already deposited into the payment contract.
    #[serde(default, with = "decimal")]
    pub deposited_funds: U256,

    /// Rate allowance already granted to the storage service.
    #[serde(default, with = "decimal")]
    pub rate_allowance: U256,

    /// Lockup allowance already granted to the storage service.
    #[serde(default, with = "decimal")]
    pub lockup_allowance: U256,

    /// Rate allowance committed to existing storage.
    #[serde(default, with = "decimal")]
    pub rate_used: U256,

    /// Lockup allowance committed to existing storage.
    #[serde(default, with = "decimal")]
    pub lockup_used: U256,

    /// Whether the client already owns a data set.
    #[serde(default)]
    pub has_data_set: bool,

    /// Monthly price per TiB without CDN.
    #[serde(default = "default_price_no_cdn", with = "decimal")]
    pub price_per_tib_per_month_no_cdn: U256,

    /// Monthly price per TiB with CDN.
    #[serde(default = "default_price_with_cdn", with = "decimal")]
    pub price_per_tib_per_month_with_cdn: U256,
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Storage policy.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Protocol constants.
    #[serde(default)]
    pub protocol: ProtocolConstants,

    /// Ledger readiness retry.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Simulated ledger seed.
    #[serde(default)]
    pub ledger: SimulatedLedgerConfig,
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            epochs_per_day: default_epochs_per_day(),
            data_set_creation_fee: default_creation_fee(),
            token: default_token(),
        }
    }
}

impl ProtocolConstants {
    /// Lockup period in epochs for the given number of days.
    #[must_use]
    pub fn lockup_period_epochs(&self, days: u32) -> u64 {
        self.epochs_per_day.saturating_mul(u64::from(days))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            with_cdn: default_with_cdn(),
            persistence_period_days: default_persistence_period(),
            min_days_threshold: default_min_days_threshold(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Build the retry policy described by this configuration.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_delay_ms))
            .with_multiplier(self.multiplier)
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

impl Default for SimulatedLedgerConfig {
    fn default() -> Self {
        Self {
            wallet_balance: default_wallet_balance(),
            deposited_funds: U256::ZERO,
            rate_allowance: U256::ZERO,
            lockup_allowance: U256::ZERO,
            rate_used: U256::ZERO,
            lockup_used: U256::ZERO,
            has_data_set: false,
            price_per_tib_per_month_no_cdn: default_price_no_cdn(),
            price_per_tib_per_month_with_cdn: default_price_with_cdn(),
        }
    }
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageConfig::default(),
            protocol: ProtocolConstants::default(),
            retry: RetryConfig::default(),
            ledger: SimulatedLedgerConfig::default(),
        }
    }
}

const fn default_epochs_per_day() -> u64 {
    EPOCHS_PER_DAY
}

fn default_creation_fee() -> U256 {
    U256::from(DATA_SET_CREATION_FEE)
}

fn default_token() -> String {
    DEFAULT_TOKEN.to_string()
}

const fn default_with_cdn() -> bool {
    true
}

const fn default_persistence_period() -> u32 {
    30
}

const fn default_min_days_threshold() -> f64 {
    10.0
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_multiplier() -> u32 {
    2
}

const fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_wallet_balance() -> U256 {
    // 100 tokens
    U256::from(100_000_000_000_000_000_000u128)
}

fn default_price_no_cdn() -> U256 {
    // 2 tokens per TiB per month
    U256::from(2_000_000_000_000_000_000u64)
}

fn default_price_with_cdn() -> U256 {
    // 3 tokens per TiB per month
    U256::from(3_000_000_000_000_000_000u64)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PreflightConfig {
    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "storage-preflight")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("storage-preflight.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the preflight cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.protocol.epochs_per_day == 0 {
            return Err(Error::Config("protocol.epochs_per_day must be positive".into()));
        }
        if self.protocol.token.trim().is_empty() {
            return Err(Error::Config("protocol.token must not be empty".into()));
        }
        if self.storage.persistence_period_days == 0 {
            return Err(Error::Config(
                "storage.persistence_period_days must be positive".into(),
            ));
        }
        if !self.storage.min_days_threshold.is_finite() || self.storage.min_days_threshold < 0.0 {
            return Err(Error::Config(
                "storage.min_days_threshold must be a non-negative number".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
