//! Token amount helpers.
//!
//! Ledger amounts are 256-bit base-unit integers. These helpers parse them
//! from user input, format them for display and (de)serialize them as
//! decimal strings so config files and JSON output stay readable.

use crate::error::{Error, Result};
use alloy_primitives::{I256, U256};
use std::str::FromStr;

/// Decimal places of the payment token (USDFC uses 18).
pub const TOKEN_DECIMALS: u8 = 18;

/// Parse a base-unit amount: decimal (`1000`, `1_000`) or `0x`-prefixed hex.
///
/// # Errors
///
/// Returns [`Error::InvalidAmount`] if the string is not a valid unsigned
/// 256-bit integer.
pub fn parse_amount(s: &str) -> Result<U256> {
    let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() {
        return Err(Error::InvalidAmount("empty amount".to_string()));
    }
    U256::from_str(&cleaned).map_err(|e| Error::InvalidAmount(format!("{s}: {e}")))
}

/// Parse a human token amount such as `0.1` into base units.
///
/// # Errors
///
/// Returns [`Error::InvalidAmount`] for malformed input, more fractional
/// digits than `decimals`, or overflow.
pub fn parse_token_amount(s: &str, decimals: u8) -> Result<U256> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if frac.len() > usize::from(decimals) {
        return Err(Error::InvalidAmount(format!(
            "{s}: more than {decimals} fractional digits"
        )));
    }
    let digits = format!("{whole}{frac:0<width$}", width = usize::from(decimals));
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidAmount(format!("{s}: not a decimal number")));
    }
    U256::from_str(&digits).map_err(|e| Error::InvalidAmount(format!("{s}: {e}")))
}

/// Format base units as a token amount, e.g. `100000000000000000` -> `0.1`.
#[must_use]
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let raw = amount.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return raw;
    }
    let padded = format!("{raw:0>width$}", width = decimals + 1);
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

/// Lossy conversion for ratio computations.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc.mul_add(18_446_744_073_709_551_616.0, limb as f64))
}

/// Lossy signed conversion for ratio computations.
#[must_use]
pub fn signed_to_f64(value: I256) -> f64 {
    let magnitude = to_f64(value.unsigned_abs());
    if value.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}

/// Serde adapter: `U256` as a decimal string; accepts strings or integers.
pub mod decimal {
    use super::parse_amount;
    use alloy_primitives::U256;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    /// Serialize as a decimal string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize from a decimal/hex string or a plain integer.
    ///
    /// # Errors
    ///
    /// Fails if the value is not a valid unsigned 256-bit amount.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => parse_amount(&s).map_err(D::Error::custom),
            Repr::Number(n) => Ok(U256::from(n)),
        }
    }
}

/// Serde adapter: `I256` as a decimal string (serialize only).
pub mod signed_decimal {
    use alloy_primitives::I256;
    use serde::Serializer;

    /// Serialize as a decimal string, with a leading `-` when negative.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &I256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }
}
