//! Allowance sufficiency evaluation.
//!
//! Decides whether the allowances a client has granted to the storage
//! payment service cover continued storage of a payload, and if not, the
//! exact allowance and deposit targets to request. Pure and deterministic:
//! safe to call speculatively, e.g. to preview an upload.

use crate::config::ProtocolConstants;
use crate::payment::amount::{decimal, signed_decimal, signed_to_f64, to_f64};
use crate::payment::balance::BalanceSnapshot;
use alloy_primitives::{Sign, I256, U256};
use serde::Serialize;
use tracing::debug;

/// Outcome of evaluating a [`BalanceSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SufficiencyResult {
    /// Both rate and lockup are sufficient.
    pub is_sufficient: bool,
    /// The granted rate allowance covers the target rate.
    pub is_rate_sufficient: bool,
    /// Enough persistence days remain and the remaining lockup covers the
    /// lockup target.
    pub is_lockup_sufficient: bool,
    /// The remaining lockup covers the lockup target (including any data set
    /// creation fee).
    pub is_lockup_balance_sufficient_for_creation: bool,
    /// Rate allowance to approve; never below the current grant.
    #[serde(with = "decimal")]
    pub rate_allowance_needed: U256,
    /// Lockup allowance to approve, including the creation fee if requested.
    #[serde(with = "decimal")]
    pub lockup_allowance_needed: U256,
    /// Deposit to make when insufficient, including the creation fee if
    /// requested.
    #[serde(with = "decimal")]
    pub deposit_amount_needed: U256,
    /// Lockup allowance not yet committed. Negative if the ledger reports
    /// more usage than allowance.
    #[serde(serialize_with = "signed_decimal::serialize")]
    pub current_lockup_remaining: I256,
    /// Lockup consumed per day at the payload's rate.
    #[serde(with = "decimal")]
    pub lockup_per_day: U256,
    /// Days the remaining lockup lasts; infinite when storage is free.
    pub persistence_days_left: f64,
}

impl SufficiencyResult {
    /// Persistence days left, or `None` when unbounded.
    #[must_use]
    pub fn finite_persistence_days(&self) -> Option<f64> {
        self.persistence_days_left
            .is_finite()
            .then_some(self.persistence_days_left)
    }
}

/// Evaluates balance snapshots against the storage protocol's constants.
#[derive(Debug, Clone, Default)]
pub struct SufficiencyEvaluator {
    constants: ProtocolConstants,
}

impl SufficiencyEvaluator {
    /// Create an evaluator for the given protocol constants.
    #[must_use]
    pub fn new(constants: ProtocolConstants) -> Self {
        Self { constants }
    }

    /// The constants this evaluator applies.
    #[must_use]
    pub fn constants(&self) -> &ProtocolConstants {
        &self.constants
    }

    /// Evaluate `balance` against a minimum persistence of `min_days_threshold`.
    ///
    /// `include_creation_fee` adds the one-time data set creation fee to both
    /// the lockup and deposit targets; callers set it when the client has no
    /// data set yet.
    #[must_use]
    pub fn evaluate(
        &self,
        balance: &BalanceSnapshot,
        min_days_threshold: f64,
        include_creation_fee: bool,
    ) -> SufficiencyResult {
        let rate_needed = balance.costs.per_epoch;
        let lockup_per_day = U256::from(self.constants.epochs_per_day).saturating_mul(rate_needed);
        let current_lockup_remaining =
            signed_difference(balance.current_lockup_allowance, balance.current_lockup_used);

        let creation_fee = if include_creation_fee {
            self.constants.data_set_creation_fee
        } else {
            U256::ZERO
        };

        // Never ask for less rate than is already granted.
        let rate_allowance_needed = balance
            .current_rate_allowance
            .max(balance.rate_allowance_needed);
        let lockup_allowance_needed = balance.lockup_allowance_needed.saturating_add(creation_fee);
        let deposit_amount_needed = balance.deposit_amount_needed.saturating_add(creation_fee);

        let is_lockup_balance_sufficient_for_creation =
            covers(current_lockup_remaining, lockup_allowance_needed);

        let persistence_days_left = if lockup_per_day.is_zero() {
            f64::INFINITY
        } else {
            signed_to_f64(current_lockup_remaining) / to_f64(lockup_per_day)
        };

        let is_rate_sufficient = balance.current_rate_allowance >= rate_allowance_needed;
        let is_lockup_sufficient =
            persistence_days_left >= min_days_threshold && is_lockup_balance_sufficient_for_creation;
        let is_sufficient = is_rate_sufficient && is_lockup_sufficient;

        debug!(
            "Allowance check: rate_needed={rate_needed} lockup_per_day={lockup_per_day} \
             lockup_remaining={current_lockup_remaining} days_left={persistence_days_left} \
             threshold={min_days_threshold} creation_fee={creation_fee}"
        );
        debug!(
            "Allowance check result: rate_ok={is_rate_sufficient} lockup_ok={is_lockup_sufficient} \
             rate_allowance={rate_allowance_needed} lockup_allowance={lockup_allowance_needed} \
             deposit={deposit_amount_needed}"
        );

        SufficiencyResult {
            is_sufficient,
            is_rate_sufficient,
            is_lockup_sufficient,
            is_lockup_balance_sufficient_for_creation,
            rate_allowance_needed,
            lockup_allowance_needed,
            deposit_amount_needed,
            current_lockup_remaining,
            lockup_per_day,
            persistence_days_left,
        }
    }
}

/// Evaluate with the default protocol constants.
///
/// See [`SufficiencyEvaluator::evaluate`].
#[must_use]
pub fn evaluate(
    balance: &BalanceSnapshot,
    min_days_threshold: f64,
    include_creation_fee: bool,
) -> SufficiencyResult {
    SufficiencyEvaluator::default().evaluate(balance, min_days_threshold, include_creation_fee)
}

/// `a - b` as a signed value, saturating at the I256 bounds.
fn signed_difference(a: U256, b: U256) -> I256 {
    if a >= b {
        I256::checked_from_sign_and_abs(Sign::Positive, a - b).unwrap_or(I256::MAX)
    } else {
        I256::checked_from_sign_and_abs(Sign::Negative, b - a).unwrap_or(I256::MIN)
    }
}

fn covers(remaining: I256, amount: U256) -> bool {
    !remaining.is_negative() && remaining.unsigned_abs() >= amount
}
