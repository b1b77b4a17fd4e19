//! Command-line interface definition.

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, WrapErr};
use std::path::PathBuf;
use std::str::FromStr;
use storage_preflight::config::PreflightConfig;

/// Allowance sufficiency checks and upload preflight for pay-per-use storage.
#[derive(Parser, Debug)]
#[command(name = "storage-preflight")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, env = "STORAGE_PREFLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate allowances without submitting any transaction.
    Check {
        /// Upload parameters.
        #[command(flatten)]
        upload: UploadArgs,

        /// Evaluate a balance snapshot JSON file instead of querying the ledger.
        ///
        /// No ledger is consulted, so `--creation-fee auto` counts as `skip`;
        /// pass `--creation-fee include` for a client without a data set.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Run the full preflight: evaluate, deposit if needed, approve.
    Run {
        /// Upload parameters.
        #[command(flatten)]
        upload: UploadArgs,
    },

    /// Show the service price and the cost of a payload.
    Price {
        /// Payload size in bytes.
        #[arg(long, default_value = "0")]
        size: u64,

        /// Price without CDN delivery.
        #[arg(long)]
        no_cdn: bool,
    },

    /// Write the default configuration file.
    InitConfig {
        /// Destination (defaults to the platform config directory).
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Creation fee policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CreationFee {
    /// Include the fee when the client has no data set yet.
    #[default]
    Auto,
    /// Always include the fee.
    Include,
    /// Never include the fee.
    Skip,
}

impl CreationFee {
    /// Whether to charge the fee when no ledger can be asked.
    #[must_use]
    pub fn offline(self) -> bool {
        self == Self::Include
    }
}

/// Parameters shared by `check` and `run`.
#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Client wallet address.
    #[arg(
        long,
        env = "STORAGE_PREFLIGHT_CLIENT",
        default_value = "0x0000000000000000000000000000000000000001"
    )]
    pub client: String,

    /// Payload size in bytes.
    #[arg(long, short)]
    pub size: u64,

    /// Store without CDN delivery.
    #[arg(long)]
    pub no_cdn: bool,

    /// Days of storage to approve lockup for.
    #[arg(long)]
    pub persistence_days: Option<u32>,

    /// Minimum days the remaining lockup must last.
    #[arg(long)]
    pub min_days: Option<f64>,

    /// Data set creation fee policy.
    #[arg(long, value_enum, default_value = "auto")]
    pub creation_fee: CreationFee,
}

impl UploadArgs {
    /// Parse the client address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not 20 hex-encoded bytes.
    pub fn client_address(&self) -> color_eyre::Result<Address> {
        Address::from_str(&self.client)
            .map_err(|e| eyre!("{e}"))
            .wrap_err_with(|| format!("invalid client address {}", self.client))
    }

    /// Apply the storage overrides on top of `config`.
    pub fn apply(&self, config: &mut PreflightConfig) {
        if self.no_cdn {
            config.storage.with_cdn = false;
        }
        if let Some(days) = self.persistence_days {
            config.storage.persistence_period_days = days;
        }
        if let Some(min_days) = self.min_days {
            config.storage.min_days_threshold = min_days;
        }
    }
}

impl Cli {
    /// Load the configuration file (if any) and apply CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded,
    /// or the resulting configuration is invalid.
    pub fn load_config(&self) -> color_eyre::Result<PreflightConfig> {
        let mut config = match self.config {
            Some(ref path) => PreflightConfig::from_file(path)
                .wrap_err_with(|| format!("loading {}", path.display()))?,
            None => {
                let default_path = PreflightConfig::default_path();
                if default_path.exists() {
                    PreflightConfig::from_file(&default_path)?
                } else {
                    PreflightConfig::default()
                }
            }
        };

        config.log_level.clone_from(&self.log_level);
        match &self.command {
            Command::Check { upload, .. } | Command::Run { upload } => upload.apply(&mut config),
            Command::Price { no_cdn, .. } => {
                if *no_cdn {
                    config.storage.with_cdn = false;
                }
            }
            Command::InitConfig { .. } => {}
        }

        config.validate()?;
        Ok(config)
    }
}
