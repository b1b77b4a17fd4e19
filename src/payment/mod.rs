//! Storage payment allowance checks.
//!
//! This module implements the allowance sufficiency strategy:
//! 1. Read the client's rate/lockup allowances and usage from the ledger
//! 2. Derive the payload's lockup consumption per day
//! 3. Require both enough persistence days and enough free lockup
//!
//! # Decision
//!
//! ```text
//!  BalanceSnapshot
//!        │
//!        ▼
//! ┌──────────────────────────┐
//! │ rate = max(current,need) │
//! │ lockup = need + fee      │
//! └───────────┬──────────────┘
//!             │
//!     ┌───────┴────────┐
//!     │                │
//!  rate ok?      remaining >= lockup
//!     │          AND days >= threshold
//!     │                │
//!     └───────┬────────┘
//!             ▼
//!        SUFFICIENT ── no ──▶ deposit + approve
//!             │
//!            yes
//!             ▼
//!          approve
//! ```

pub mod amount;
mod balance;
mod sufficiency;

pub use balance::{
    calculate_current_storage_usage, BalanceSnapshot, ServicePrice, StorageCosts, StorageUsage,
    GIB, TIB,
};
pub use sufficiency::{evaluate, SufficiencyEvaluator, SufficiencyResult};
