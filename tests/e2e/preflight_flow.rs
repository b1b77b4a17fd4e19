//! Preflight flows against the in-memory ledger.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::{HarnessError, READINESS_ATTEMPTS};
use super::{RecordingSink, TestHarness};
use alloy_primitives::{B256, U256};
use storage_preflight::config::{SimulatedLedgerConfig, DATA_SET_CREATION_FEE};
use storage_preflight::ledger::LedgerError;
use storage_preflight::preflight::{create_status_channel, ChannelSink, StatusUpdate};
use storage_preflight::{
    evaluate, BalanceSnapshot, Error, PreflightStage, TracingSink, TransactionKind,
};

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

fn tokens(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn well_funded() -> SimulatedLedgerConfig {
    SimulatedLedgerConfig {
        deposited_funds: tokens(100),
        rate_allowance: tokens(1),
        lockup_allowance: tokens(100),
        has_data_set: true,
        ..SimulatedLedgerConfig::default()
    }
}

/// First upload pays the creation fee; the second sees the committed usage
/// and only tops up what the new payload needs.
#[tokio::test]
async fn test_upload_lifecycle() {
    let harness = TestHarness::setup();
    let sink = RecordingSink::default();

    assert!(harness
        .orchestrator()
        .creation_fee_required(harness.client())
        .await
        .expect("fee check"));

    let first = harness.upload(GIB, &sink).await.expect("first upload");
    assert_eq!(first.stage, PreflightStage::Approved);
    assert!(first.deposit.is_some());
    let fee = U256::from(DATA_SET_CREATION_FEE);
    assert_eq!(
        first.result.lockup_allowance_needed,
        first.balance.lockup_allowance_needed + fee
    );
    assert_eq!(
        first.result.deposit_amount_needed,
        first.balance.deposit_amount_needed + fee
    );

    let account = harness.account().expect("account");
    assert!(account.has_data_set);
    assert_eq!(account.funds, first.result.deposit_amount_needed);
    assert_eq!(account.rate_used, first.balance.costs.per_epoch);

    assert!(!harness
        .orchestrator()
        .creation_fee_required(harness.client())
        .await
        .expect("fee check"));

    let second = harness.upload(GIB, &sink).await.expect("second upload");
    // Committed usage doubles the rate target for the same payload size.
    assert_eq!(
        second.result.rate_allowance_needed,
        first.result.rate_allowance_needed * U256::from(2u64)
    );
    assert!(!second.result.is_rate_sufficient);
    // The unspent creation fee still covers the new lockup.
    assert_eq!(second.result.deposit_amount_needed, U256::ZERO);
    assert_eq!(harness.ledger().deposit_count(), 2);
    assert_eq!(harness.ledger().approval_count(), 2);

    let account = harness.account().expect("account");
    assert_eq!(account.rate_allowance, second.result.rate_allowance_needed);
    assert_eq!(account.lockup_allowance, second.result.lockup_allowance_needed);
}

#[tokio::test]
async fn test_sufficient_client_only_approves() {
    let harness = TestHarness::setup_with_seed(well_funded());
    let sink = RecordingSink::default();

    let outcome = harness.upload(MIB, &sink).await.expect("upload");

    assert!(outcome.result.is_sufficient);
    assert!(outcome.deposit.is_none());
    assert_eq!(harness.ledger().deposit_count(), 0);
    assert_eq!(harness.ledger().approval_count(), 1);
    assert_eq!(sink.progress(), vec![0, 20, 50, 60, 100]);
    assert!(sink.messages().iter().any(|m| m == "USDFC allowance sufficient"));

    // Granted rate is never lowered.
    let account = harness.account().expect("account");
    assert_eq!(account.rate_allowance, tokens(1));
}

#[tokio::test]
async fn test_check_does_not_submit_transactions() {
    let harness = TestHarness::setup();
    let request = harness.request(GIB).await.expect("request");

    let check = harness
        .orchestrator()
        .check(&request)
        .await
        .expect("check");

    assert!(!check.result.is_sufficient);
    assert!(check.result.deposit_amount_needed > U256::ZERO);
    assert_eq!(harness.ledger().deposit_count(), 0);
    assert_eq!(harness.ledger().approval_count(), 0);
    assert_eq!(harness.account().expect("account").funds, U256::ZERO);
}

#[tokio::test]
async fn test_readiness_is_retried() {
    let harness = TestHarness::setup_with_seed(well_funded());
    harness.ledger().fail_readiness(READINESS_ATTEMPTS - 1);

    let outcome = harness.upload(MIB, &TracingSink).await.expect("upload");
    assert_eq!(outcome.stage, PreflightStage::Approved);
}

#[tokio::test]
async fn test_ledger_never_ready() {
    let harness = TestHarness::setup();
    harness.ledger().fail_readiness(READINESS_ATTEMPTS * 2);
    let sink = RecordingSink::default();

    let err = harness.upload(MIB, &sink).await.expect_err("must fail");

    assert!(matches!(
        err,
        HarnessError::Preflight(Error::LedgerUnavailable(LedgerError::NotReady(_)))
    ));
    assert!(sink.progress().is_empty());
}

#[tokio::test]
async fn test_empty_wallet_aborts_before_approval() {
    let harness = TestHarness::setup_with_seed(SimulatedLedgerConfig {
        wallet_balance: U256::ZERO,
        ..SimulatedLedgerConfig::default()
    });
    let sink = RecordingSink::default();

    let err = harness.upload(GIB, &sink).await.expect_err("must fail");

    match err {
        HarnessError::Preflight(Error::TransactionRejected {
            kind: TransactionKind::Deposit,
            source: LedgerError::InsufficientFunds { available, required },
        }) => {
            assert_eq!(available, U256::ZERO);
            assert!(required > U256::ZERO);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.ledger().approval_count(), 0);
    assert_eq!(sink.progress(), vec![0, 20, 30]);
    assert!(!harness.account().expect("account").has_data_set);
}

#[tokio::test]
async fn test_reverted_approval_is_surfaced() {
    let harness = TestHarness::setup_with_seed(well_funded());
    harness.ledger().fail_next_approval(LedgerError::Reverted {
        tx_hash: B256::repeat_byte(0xee),
        reason: "paused".to_string(),
    });
    let sink = RecordingSink::default();

    let err = harness.upload(MIB, &sink).await.expect_err("must fail");

    let err = match err {
        HarnessError::Preflight(err) => err,
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(matches!(
        err,
        Error::TransactionRejected {
            kind: TransactionKind::Approval,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(sink.progress().last(), Some(&60));

    // A re-run after the failure succeeds.
    let outcome = harness.upload(MIB, &sink).await.expect("retry upload");
    assert_eq!(outcome.stage, PreflightStage::Approved);
}

#[tokio::test]
async fn test_channel_sink_streams_every_stage() {
    let harness = TestHarness::setup();
    let (tx, mut rx) = create_status_channel();
    let sink = ChannelSink::new(tx);

    harness.upload(GIB, &sink).await.expect("upload");

    let mut messages = Vec::new();
    let mut progress = Vec::new();
    while let Ok(update) = rx.try_recv() {
        match update {
            StatusUpdate::Message { text, .. } => messages.push(text),
            StatusUpdate::Progress { percent, .. } => progress.push(percent),
        }
    }

    assert_eq!(progress, vec![0, 20, 30, 50, 60, 100]);
    assert_eq!(
        messages.first().map(String::as_str),
        Some("Checking balance and storage allowances...")
    );
    assert!(messages.iter().any(|m| m == "Allowance check insufficient"));
    assert!(messages.iter().any(|m| m.starts_with("Approving USDFC... 0x")));
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Storage service approved to spend USDFC")
    );
}

#[test]
fn test_snapshot_from_json() {
    let json = r#"{
        "rateAllowanceNeeded": "1",
        "lockupAllowanceNeeded": "86400",
        "currentRateAllowance": "1",
        "currentLockupAllowance": "14400",
        "currentRateUsed": "0",
        "currentLockupUsed": "0",
        "costs": { "perEpoch": "1", "perDay": "2880", "perMonth": "86400" },
        "depositAmountNeeded": "0"
    }"#;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, json).expect("write");

    let content = std::fs::read_to_string(&path).expect("read");
    let snapshot: BalanceSnapshot = serde_json::from_str(&content).expect("parse");
    let result = evaluate(&snapshot, 10.0, false);

    assert!(result.is_rate_sufficient);
    assert!(!result.is_lockup_sufficient);
    assert!((result.persistence_days_left - 5.0).abs() < f64::EPSILON);
    assert_eq!(result.lockup_allowance_needed, U256::from(86_400u64));
    assert!(!result.is_lockup_balance_sufficient_for_creation);
}
