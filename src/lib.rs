//! # storage-preflight
//!
//! Allowance sufficiency checks and upload preflight for pay-per-use
//! decentralized storage.
//!
//! Before a payload is uploaded to a warm-storage service, the client must
//! hold enough rate and lockup allowance on the payment ledger to keep that
//! payload stored for the configured period. This crate:
//!
//! - Evaluates a [`BalanceSnapshot`] against a minimum persistence threshold
//!   and computes exact top-up targets ([`payment::evaluate`])
//! - Sequences the fetch, evaluate, deposit and approve steps against a
//!   [`Ledger`] while reporting progress ([`PreflightOrchestrator`])
//! - Ships a deterministic in-memory ledger for tests and offline previews
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storage_preflight::{
//!     InMemoryLedger, PreflightOrchestrator, PreflightRequest, ProtocolConstants, TracingSink,
//! };
//!
//! let ledger = Arc::new(InMemoryLedger::default());
//! let orchestrator = PreflightOrchestrator::new(ledger, ProtocolConstants::default());
//! let fee = orchestrator.creation_fee_required(client).await?;
//! let request = PreflightRequest::new(client, 4096).with_creation_fee(fee);
//! let outcome = orchestrator.run_preflight(&request, &TracingSink).await?;
//! assert!(outcome.stage.is_terminal());
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod preflight;
pub mod retry;

pub use config::{PreflightConfig, ProtocolConstants, StorageConfig};
pub use error::{Error, Result, TransactionKind};
pub use ledger::{InMemoryLedger, Ledger, LedgerError, StorageRequest, TransactionReceipt};
pub use payment::{evaluate, BalanceSnapshot, StorageCosts, SufficiencyResult};
pub use preflight::{
    PreflightOrchestrator, PreflightOutcome, PreflightRequest, PreflightStage, StatusSink,
    TracingSink,
};
pub use retry::RetryPolicy;
