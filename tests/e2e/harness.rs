//! Test harness wiring an in-memory ledger to a preflight orchestrator.
//!
//! The `TestHarness` gives every test its own ledger, seeded from a
//! [`SimulatedLedgerConfig`], and an orchestrator with a fast readiness
//! policy so failure paths do not slow the suite down.

use alloy_primitives::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use storage_preflight::config::SimulatedLedgerConfig;
use storage_preflight::{
    InMemoryLedger, PreflightOrchestrator, PreflightOutcome, PreflightRequest, ProtocolConstants,
    RetryPolicy, StatusSink, StorageRequest,
};
use tracing::info;

/// Error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Preflight failed.
    #[error("Preflight error: {0}")]
    Preflight(#[from] storage_preflight::Error),

    /// The ledger lost track of the client.
    #[error("Account not found: {0}")]
    AccountNotFound(Address),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Readiness attempts made by harness orchestrators.
pub const READINESS_ATTEMPTS: u32 = 3;

/// Records every status message and progress value it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    progress: Mutex<Vec<u8>>,
}

impl RecordingSink {
    /// Messages in arrival order.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Progress values in arrival order.
    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().clone()
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn progress(&self, percent: u8) {
        self.progress.lock().push(percent);
    }
}

/// One client, one ledger, one orchestrator.
pub struct TestHarness {
    client: Address,
    ledger: Arc<InMemoryLedger>,
    orchestrator: PreflightOrchestrator,
}

impl TestHarness {
    /// Harness for a client with a funded wallet and nothing else.
    pub fn setup() -> Self {
        Self::setup_with_seed(SimulatedLedgerConfig::default())
    }

    /// Harness for a client seeded with `seed`.
    pub fn setup_with_seed(seed: SimulatedLedgerConfig) -> Self {
        let client = Address::repeat_byte(0xc1);
        info!("Setting up preflight harness for {client}");

        let constants = ProtocolConstants::default();
        let ledger = Arc::new(InMemoryLedger::from_config(client, &seed, constants.clone()));
        let orchestrator = PreflightOrchestrator::new(ledger.clone(), constants)
            .with_retry_policy(RetryPolicy::new(READINESS_ATTEMPTS, Duration::from_millis(1)));

        Self {
            client,
            ledger,
            orchestrator,
        }
    }

    /// The client address.
    pub fn client(&self) -> Address {
        self.client
    }

    /// The simulated ledger.
    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    /// The orchestrator under test.
    pub fn orchestrator(&self) -> &PreflightOrchestrator {
        &self.orchestrator
    }

    /// Request for `size` bytes with default storage settings, charging the
    /// creation fee only if the client has no data set yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub async fn request(&self, size: u64) -> Result<PreflightRequest> {
        let include_fee = self.orchestrator.creation_fee_required(self.client).await?;
        Ok(PreflightRequest::new(self.client, size).with_creation_fee(include_fee))
    }

    /// Run a preflight for `size` bytes and, if it succeeds, record the
    /// upload on the ledger the way the storage service would.
    ///
    /// # Errors
    ///
    /// Returns an error if the preflight fails.
    pub async fn upload(&self, size: u64, sink: &dyn StatusSink) -> Result<PreflightOutcome> {
        let request = self.request(size).await?;
        let outcome = self.orchestrator.run_preflight(&request, sink).await?;
        let stored: StorageRequest = request.storage_request();
        self.ledger.commit_storage(self.client, &stored);
        Ok(outcome)
    }

    /// Current ledger state of the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has no account.
    pub fn account(&self) -> Result<storage_preflight::ledger::AccountState> {
        self.ledger
            .account(self.client)
            .ok_or(HarnessError::AccountNotFound(self.client))
    }
}
