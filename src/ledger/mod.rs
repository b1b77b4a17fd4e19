//! Payment ledger contract.
//!
//! The ledger is the storage network's payment service: it prices storage,
//! reports a client's allowances, accepts deposits and records spending
//! approvals for the storage service. This crate only consumes it; the
//! [`Ledger`] trait is the seam where an SDK-backed client plugs in.
//!
//! [`InMemoryLedger`] is a deterministic stand-in for tests and offline
//! previews.

mod memory;

pub use memory::{AccountState, InMemoryLedger};

use crate::payment::{BalanceSnapshot, ServicePrice};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors reported by a ledger implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The provider behind the ledger is not connected yet.
    #[error("ledger provider not ready: {0}")]
    NotReady(String),

    /// Transport or RPC failure.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The signer or the chain refused the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted: {reason}")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: B256,
        /// Revert reason.
        reason: String,
    },

    /// The wallet cannot cover the requested amount.
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        /// Spendable balance.
        available: U256,
        /// Requested amount.
        required: U256,
    },
}

/// Payload whose storage the client wants to pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRequest {
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Serve through the accelerated delivery network.
    pub with_cdn: bool,
    /// Days of storage to pay for.
    pub persistence_period_days: u32,
}

/// Confirmation of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
}

/// Progress reported while a deposit is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositEvent {
    /// The deposit is about to be submitted.
    Starting,
    /// The token allowance of the payment contract was checked.
    AllowanceChecked {
        /// Token allowance currently granted to the payment contract.
        current: U256,
        /// Amount the deposit needs.
        required: U256,
    },
    /// A token approval transaction was submitted ahead of the deposit.
    ApprovalSubmitted {
        /// Approval transaction hash.
        tx_hash: B256,
    },
    /// The token approval was confirmed.
    ApprovalConfirmed {
        /// Approval transaction hash.
        tx_hash: B256,
    },
}

/// Callback receiving [`DepositEvent`]s.
pub type DepositObserver<'a> = &'a (dyn Fn(DepositEvent) + Send + Sync);

/// The storage network's payment service, as seen by one signer.
///
/// Every call that returns a [`TransactionReceipt`] resolves only after the
/// transaction is confirmed. Submitted transactions are irrevocable.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Address of the storage service that spends from approved allowances.
    fn service_address(&self) -> Address;

    /// Succeeds once the provider can serve requests.
    async fn ensure_ready(&self) -> Result<(), LedgerError>;

    /// Price list of the storage service.
    async fn service_price(&self) -> Result<ServicePrice, LedgerError>;

    /// Allowance state of `client` and the cost of storing `request`.
    async fn fetch_balance(
        &self,
        client: Address,
        request: &StorageRequest,
    ) -> Result<BalanceSnapshot, LedgerError>;

    /// Whether `client` already owns a data set with the storage service.
    async fn has_data_set(&self, client: Address) -> Result<bool, LedgerError>;

    /// Deposit `amount` of `token` into the payment contract.
    async fn deposit(
        &self,
        amount: U256,
        token: &str,
        observer: DepositObserver<'_>,
    ) -> Result<TransactionReceipt, LedgerError>;

    /// Approve `service` to spend at `rate_allowance` per epoch with up to
    /// `lockup_allowance` locked over `lockup_period_epochs`.
    async fn approve_service(
        &self,
        service: Address,
        rate_allowance: U256,
        lockup_allowance: U256,
        lockup_period_epochs: u64,
    ) -> Result<TransactionReceipt, LedgerError>;
}
