//! Ledger balance snapshots and storage cost types.
//!
//! A [`BalanceSnapshot`] is read fresh from the payment ledger for every
//! preflight and never cached: acting on a stale allowance could trigger a
//! deposit the client does not need, or skip one it does.

use crate::config::DAYS_PER_MONTH;
use crate::payment::amount::{decimal, to_f64};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Bytes in one GiB.
pub const GIB: u64 = 1 << 30;

/// Bytes in one TiB.
pub const TIB: u64 = 1 << 40;

/// Spend rate of a payload, in token base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCosts {
    /// Cost per epoch.
    #[serde(with = "decimal")]
    pub per_epoch: U256,
    /// Cost per day.
    #[serde(with = "decimal")]
    pub per_day: U256,
    /// Cost per month.
    #[serde(with = "decimal")]
    pub per_month: U256,
}

/// Allowance and usage state of a client against the storage payment service.
///
/// All quantities are token base units. The ledger is trusted to report
/// `current_rate_used <= current_rate_allowance` and
/// `current_lockup_used <= current_lockup_allowance`; this type does not
/// re-check it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    /// Minimum rate allowance (per epoch) needed to sustain the target storage.
    #[serde(with = "decimal")]
    pub rate_allowance_needed: U256,
    /// Minimum lockup allowance needed.
    #[serde(with = "decimal")]
    pub lockup_allowance_needed: U256,
    /// Rate allowance already granted to the service.
    #[serde(with = "decimal")]
    pub current_rate_allowance: U256,
    /// Lockup allowance already granted to the service.
    #[serde(with = "decimal")]
    pub current_lockup_allowance: U256,
    /// Part of the rate allowance committed to existing storage.
    #[serde(with = "decimal")]
    pub current_rate_used: U256,
    /// Part of the lockup allowance committed to existing storage.
    #[serde(with = "decimal")]
    pub current_lockup_used: U256,
    /// Spend rate of the payload being checked.
    pub costs: StorageCosts,
    /// Additional prepaid balance needed, independent of allowances.
    #[serde(with = "decimal")]
    pub deposit_amount_needed: U256,
}

/// Price list of the warm storage service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrice {
    /// Price per TiB per month without CDN delivery.
    #[serde(with = "decimal")]
    pub price_per_tib_per_month_no_cdn: U256,
    /// Price per TiB per month with CDN delivery.
    #[serde(with = "decimal")]
    pub price_per_tib_per_month_with_cdn: U256,
}

impl ServicePrice {
    /// Monthly price per TiB for the chosen delivery mode.
    #[must_use]
    pub fn per_tib_per_month(&self, with_cdn: bool) -> U256 {
        if with_cdn {
            self.price_per_tib_per_month_with_cdn
        } else {
            self.price_per_tib_per_month_no_cdn
        }
    }

    /// Cost triple for storing `size_bytes`, rounding each period up so that a
    /// non-empty payload is never free.
    #[must_use]
    pub fn costs_for(&self, size_bytes: u64, with_cdn: bool, epochs_per_day: u64) -> StorageCosts {
        if size_bytes == 0 {
            return StorageCosts::default();
        }
        let per_month = div_ceil(
            self.per_tib_per_month(with_cdn)
                .saturating_mul(U256::from(size_bytes)),
            U256::from(TIB),
        );
        let epochs_per_month = U256::from(epochs_per_day).saturating_mul(U256::from(DAYS_PER_MONTH));
        let per_epoch = div_ceil(per_month, epochs_per_month);
        StorageCosts {
            per_epoch,
            per_day: per_epoch.saturating_mul(U256::from(epochs_per_day)),
            per_month,
        }
    }
}

/// Estimate of how much data the client already stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    /// Estimated stored bytes.
    #[serde(with = "decimal")]
    pub bytes: U256,
    /// The same estimate in GiB.
    pub gib: f64,
}

/// Estimate current storage usage from the share of rate allowance in use.
///
/// `rate_allowance_needed` corresponds to `storage_capacity_bytes`, so the
/// used rate scales proportionally. Returns zero when either rate is zero.
#[must_use]
pub fn calculate_current_storage_usage(
    balance: &BalanceSnapshot,
    storage_capacity_bytes: u64,
) -> StorageUsage {
    if balance.current_rate_used.is_zero() || balance.rate_allowance_needed.is_zero() {
        return StorageUsage::default();
    }
    let bytes = balance
        .current_rate_used
        .saturating_mul(U256::from(storage_capacity_bytes))
        / balance.rate_allowance_needed;
    #[allow(clippy::cast_precision_loss)]
    let gib = to_f64(bytes) / GIB as f64;
    StorageUsage { bytes, gib }
}

fn div_ceil(numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        quotient
    } else {
        quotient + U256::from(1u64)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn price() -> ServicePrice {
        ServicePrice {
            price_per_tib_per_month_no_cdn: U256::from(2_000_000_000_000_000_000u64),
            price_per_tib_per_month_with_cdn: U256::from(3_000_000_000_000_000_000u64),
        }
    }

    #[test]
    fn test_costs_for_one_tib() {
        let costs = price().costs_for(TIB, false, 2880);
        assert_eq!(costs.per_month, U256::from(2_000_000_000_000_000_000u64));
        // 2e18 / 86400 epochs, rounded up
        assert_eq!(costs.per_epoch, U256::from(23_148_148_148_149u64));
        assert_eq!(costs.per_day, costs.per_epoch * U256::from(2880u64));
    }

    #[test]
    fn test_costs_for_small_payload_never_free() {
        let costs = price().costs_for(1, true, 2880);
        assert!(!costs.per_epoch.is_zero());
        assert!(!costs.per_month.is_zero());
        assert!(costs.per_month < U256::from(3_000_000u64));
    }

    #[test]
    fn test_costs_for_empty_payload() {
        assert_eq!(price().costs_for(0, true, 2880), StorageCosts::default());
    }

    #[test]
    fn test_cdn_selects_price() {
        let p = price();
        assert_eq!(p.per_tib_per_month(true), p.price_per_tib_per_month_with_cdn);
        assert_eq!(p.per_tib_per_month(false), p.price_per_tib_per_month_no_cdn);
    }

    #[test]
    fn test_storage_usage_proportional() {
        let balance = BalanceSnapshot {
            rate_allowance_needed: U256::from(100u64),
            current_rate_used: U256::from(50u64),
            ..Default::default()
        };
        let usage = calculate_current_storage_usage(&balance, 2 * GIB);
        assert_eq!(usage.bytes, U256::from(GIB));
        assert!((usage.gib - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_storage_usage_zero_rate() {
        let balance = BalanceSnapshot {
            current_rate_used: U256::from(50u64),
            ..Default::default()
        };
        assert_eq!(
            calculate_current_storage_usage(&balance, GIB),
            StorageUsage::default()
        );
    }

    #[test]
    fn test_snapshot_json_uses_decimal_strings() {
        let balance = BalanceSnapshot {
            current_lockup_allowance: U256::from(1000u64),
            ..Default::default()
        };
        let json = serde_json::to_value(balance).expect("serialize");
        assert_eq!(json["currentLockupAllowance"], "1000");
        assert_eq!(json["costs"]["perEpoch"], "0");

        let parsed: BalanceSnapshot = serde_json::from_value(serde_json::json!({
            "rateAllowanceNeeded": "80",
            "lockupAllowanceNeeded": 500,
            "currentRateAllowance": "100",
            "currentLockupAllowance": "0x3e8",
            "currentRateUsed": "0",
            "currentLockupUsed": "200",
            "costs": {"perEpoch": "1", "perDay": "2880", "perMonth": "86400"},
            "depositAmountNeeded": "0"
        }))
        .expect("deserialize");
        assert_eq!(parsed.current_lockup_allowance, U256::from(1000u64));
        assert_eq!(parsed.lockup_allowance_needed, U256::from(500u64));
    }
}
