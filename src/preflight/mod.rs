//! Upload preflight orchestration.
//!
//! Runs before every upload:
//!
//! ```text
//! CHECKING ──▶ EVALUATED ──┬── insufficient ──▶ DEPOSITING ──▶ DEPOSITED ──┐
//!                          │                                              │
//!                          └── sufficient ────────────────────────────────┤
//!                                                                         ▼
//!                                                      APPROVING ──▶ APPROVED
//! ```
//!
//! The approval always runs: sufficient allowances do not prove that the
//! storage service's spending approval is active. Any failed call aborts the
//! preflight with the ledger's error; nothing is retried here; the caller may
//! re-run the whole upload.
//!
//! Deposits and approvals mutate the signer's allowance state, so callers
//! must not run two preflights for the same signer concurrently.

mod status;

pub use status::{
    create_status_channel, ChannelSink, StatusReceiver, StatusSender, StatusSink, StatusUpdate,
    TracingSink,
};

use crate::config::{ProtocolConstants, StorageConfig};
use crate::error::{Error, Result, TransactionKind};
use crate::ledger::{DepositEvent, Ledger, StorageRequest, TransactionReceipt};
use crate::payment::amount::{format_token_amount, TOKEN_DECIMALS};
use crate::payment::{BalanceSnapshot, SufficiencyEvaluator, SufficiencyResult};
use crate::retry::RetryPolicy;
use alloy_primitives::Address;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Stages of a preflight run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreflightStage {
    /// Reading the balance snapshot.
    Checking,
    /// Sufficiency evaluated.
    Evaluated,
    /// Deposit submitted.
    Depositing,
    /// Deposit confirmed.
    Deposited,
    /// Service approval submitted.
    Approving,
    /// Service approval confirmed.
    Approved,
}

impl PreflightStage {
    /// Progress percentage reported on entering this stage.
    #[must_use]
    pub fn progress(self) -> u8 {
        match self {
            Self::Checking => 0,
            Self::Evaluated => 20,
            Self::Depositing => 30,
            Self::Deposited => 50,
            Self::Approving => 60,
            Self::Approved => 100,
        }
    }

    /// True for the final, successful stage.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Approved
    }
}

impl fmt::Display for PreflightStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checking => "CHECKING",
            Self::Evaluated => "EVALUATED",
            Self::Depositing => "DEPOSITING",
            Self::Deposited => "DEPOSITED",
            Self::Approving => "APPROVING",
            Self::Approved => "APPROVED",
        };
        f.write_str(name)
    }
}

/// Everything a preflight needs to know about one upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreflightRequest {
    /// Client paying for storage.
    pub client: Address,
    /// Payload size in bytes.
    pub payload_size: u64,
    /// Serve through the accelerated delivery network.
    pub with_cdn: bool,
    /// Days of storage to approve lockup for.
    pub persistence_period_days: u32,
    /// Minimum days the remaining lockup must last.
    pub min_days_threshold: f64,
    /// Add the one-time data set creation fee.
    pub include_creation_fee: bool,
}

impl PreflightRequest {
    /// Request with the default storage policy and no creation fee.
    #[must_use]
    pub fn new(client: Address, payload_size: u64) -> Self {
        Self::from_storage_config(client, payload_size, &StorageConfig::default())
    }

    /// Request using the given storage policy.
    #[must_use]
    pub fn from_storage_config(client: Address, payload_size: u64, storage: &StorageConfig) -> Self {
        Self {
            client,
            payload_size,
            with_cdn: storage.with_cdn,
            persistence_period_days: storage.persistence_period_days,
            min_days_threshold: storage.min_days_threshold,
            include_creation_fee: false,
        }
    }

    /// Set whether the data set creation fee applies.
    #[must_use]
    pub fn with_creation_fee(mut self, include: bool) -> Self {
        self.include_creation_fee = include;
        self
    }

    /// The ledger-facing part of the request.
    #[must_use]
    pub fn storage_request(&self) -> StorageRequest {
        StorageRequest {
            size_bytes: self.payload_size,
            with_cdn: self.with_cdn,
            persistence_period_days: self.persistence_period_days,
        }
    }
}

/// Read-only result of a speculative check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightCheck {
    /// Snapshot the evaluation was based on.
    pub balance: BalanceSnapshot,
    /// Evaluation outcome.
    pub result: SufficiencyResult,
}

/// Result of a completed preflight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightOutcome {
    /// Snapshot the evaluation was based on.
    pub balance: BalanceSnapshot,
    /// Evaluation outcome.
    pub result: SufficiencyResult,
    /// Deposit receipt, if a deposit was needed.
    pub deposit: Option<TransactionReceipt>,
    /// Service approval receipt.
    pub approval: TransactionReceipt,
    /// Final stage reached.
    pub stage: PreflightStage,
}

/// Sequences balance fetch, evaluation, deposit and approval against a ledger.
pub struct PreflightOrchestrator {
    ledger: Arc<dyn Ledger>,
    evaluator: SufficiencyEvaluator,
    retry: RetryPolicy,
}

impl PreflightOrchestrator {
    /// Create an orchestrator for `ledger` using `constants`.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, constants: ProtocolConstants) -> Self {
        Self {
            ledger,
            evaluator: SufficiencyEvaluator::new(constants),
            retry: RetryPolicy::default(),
        }
    }

    /// Poll ledger readiness with `retry` before the first read.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Protocol constants in use.
    #[must_use]
    pub fn constants(&self) -> &ProtocolConstants {
        self.evaluator.constants()
    }

    /// Wait until the ledger provider is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerUnavailable`] once the retry policy is exhausted.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let ledger = &self.ledger;
        self.retry
            .retry(|attempt| async move {
                if attempt > 1 {
                    warn!("Ledger not ready, attempt {attempt}");
                }
                ledger.ensure_ready().await
            })
            .await
            .map_err(Error::LedgerUnavailable)
    }

    /// Whether `client` still has to pay the data set creation fee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerUnavailable`] if the ledger cannot be read.
    pub async fn creation_fee_required(&self, client: Address) -> Result<bool> {
        self.wait_until_ready().await?;
        let has_data_set = self
            .ledger
            .has_data_set(client)
            .await
            .map_err(Error::LedgerUnavailable)?;
        Ok(!has_data_set)
    }

    /// Fetch and evaluate without submitting anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerUnavailable`] if the ledger cannot be read.
    pub async fn check(&self, request: &PreflightRequest) -> Result<PreflightCheck> {
        self.wait_until_ready().await?;
        let balance = self
            .ledger
            .fetch_balance(request.client, &request.storage_request())
            .await
            .map_err(Error::LedgerUnavailable)?;
        let result = self.evaluator.evaluate(
            &balance,
            request.min_days_threshold,
            request.include_creation_fee,
        );
        Ok(PreflightCheck { balance, result })
    }

    /// Run the full preflight, reporting progress to `sink`.
    ///
    /// # Errors
    ///
    /// - [`Error::LedgerUnavailable`] if the balance cannot be read
    /// - [`Error::TransactionRejected`] if the deposit or approval fails
    pub async fn run_preflight(
        &self,
        request: &PreflightRequest,
        sink: &dyn StatusSink,
    ) -> Result<PreflightOutcome> {
        let token = self.constants().token.clone();
        info!(
            "Preflight for {} ({} bytes, cdn={}, {} days, creation_fee={})",
            request.client,
            request.payload_size,
            request.with_cdn,
            request.persistence_period_days,
            request.include_creation_fee
        );

        enter(sink, PreflightStage::Checking, "Checking balance and storage allowances...");
        let PreflightCheck { balance, result } = self.check(request).await?;

        let deposit = if result.is_sufficient {
            enter(sink, PreflightStage::Evaluated, &format!("{token} allowance sufficient"));
            sink.progress(PreflightStage::Deposited.progress());
            None
        } else {
            warn!(
                "Allowance insufficient (rate_ok={}, lockup_ok={}, days_left={:.2})",
                result.is_rate_sufficient,
                result.is_lockup_sufficient,
                result.persistence_days_left
            );
            enter(
                sink,
                PreflightStage::Evaluated,
                &format!("Insufficient {token} allowance, depositing..."),
            );
            Some(self.deposit(&result, &token, sink).await?)
        };

        enter(
            sink,
            PreflightStage::Approving,
            "Approving storage service spending rates...",
        );
        let lockup_period = self
            .constants()
            .lockup_period_epochs(request.persistence_period_days);
        let approval = self
            .ledger
            .approve_service(
                self.ledger.service_address(),
                result.rate_allowance_needed,
                result.lockup_allowance_needed,
                lockup_period,
            )
            .await
            .map_err(|source| Error::TransactionRejected {
                kind: TransactionKind::Approval,
                source,
            })?;
        enter(
            sink,
            PreflightStage::Approved,
            &format!("Storage service approved to spend {token}"),
        );
        info!(
            "Preflight complete: approval {} in block {}",
            approval.tx_hash, approval.block_number
        );

        Ok(PreflightOutcome {
            balance,
            result,
            deposit,
            approval,
            stage: PreflightStage::Approved,
        })
    }

    async fn deposit(
        &self,
        result: &SufficiencyResult,
        token: &str,
        sink: &dyn StatusSink,
    ) -> Result<TransactionReceipt> {
        let amount = result.deposit_amount_needed;
        let display_amount = format_token_amount(amount, TOKEN_DECIMALS);
        sink.progress(PreflightStage::Depositing.progress());

        let observer = |event: DepositEvent| sink.status(&describe_deposit_event(event, &display_amount, token));
        let receipt = self
            .ledger
            .deposit(amount, token, &observer)
            .await
            .map_err(|source| Error::TransactionRejected {
                kind: TransactionKind::Deposit,
                source,
            })?;

        enter(
            sink,
            PreflightStage::Deposited,
            &format!("{token} deposited successfully"),
        );
        info!(
            "Deposited {display_amount} {token}: {} in block {}",
            receipt.tx_hash, receipt.block_number
        );
        Ok(receipt)
    }
}

fn enter(sink: &dyn StatusSink, stage: PreflightStage, message: &str) {
    sink.status(message);
    sink.progress(stage.progress());
}

fn describe_deposit_event(event: DepositEvent, amount: &str, token: &str) -> String {
    match event {
        DepositEvent::Starting => format!("Depositing {amount} {token}..."),
        DepositEvent::AllowanceChecked { current, required } => format!(
            "Allowance check {}",
            // Equal allowance covers the deposit without a new token approval.
            if current >= required {
                "sufficient"
            } else {
                "insufficient"
            }
        ),
        DepositEvent::ApprovalSubmitted { tx_hash } => format!("Approving {token}... {tx_hash}"),
        DepositEvent::ApprovalConfirmed { tx_hash } => format!("{token} approved {tx_hash}"),
    }
}
