//! Error types for storage-preflight.

use crate::ledger::LedgerError;
use std::fmt;
use thiserror::Error;

/// Result type alias using the crate's [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The mutating ledger call that failed during a preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Additional funds deposited into the payment ledger.
    Deposit,
    /// Spending approval granted to the storage service.
    Approval,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Approval => write!(f, "service approval"),
        }
    }
}

/// Errors that can occur while checking allowances or running a preflight.
#[derive(Debug, Error)]
pub enum Error {
    /// The payment ledger could not be read (network/RPC error or never ready).
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(#[source] LedgerError),

    /// A deposit or approval transaction was rejected by the signer or chain.
    #[error("{kind} transaction rejected: {source}")]
    TransactionRejected {
        /// Which transaction failed.
        kind: TransactionKind,
        /// The ledger's error, unchanged.
        #[source]
        source: LedgerError,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A token amount or address could not be parsed.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if re-running the whole upload might succeed.
    ///
    /// Ledger outages and rejected transactions leave no local state behind,
    /// so the caller can simply invoke the preflight again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LedgerUnavailable(_) | Self::TransactionRejected { .. }
        )
    }
}
