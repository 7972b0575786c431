//! Bounds-checked integer conversions.
//!
//! Every conversion either returns the exact same number in the target type
//! or [`MathError::CastOverflow`]; nothing truncates or wraps silently.

use crate::{MathError, Result, I256, U256};

fn overflow(value: impl ToString, target: &'static str) -> MathError {
    MathError::CastOverflow {
        value: value.to_string(),
        target,
    }
}

/// Narrow a `U256` into `u128`.
///
/// # Errors
///
/// - [`MathError::CastOverflow`] if the high word is set
pub fn to_u128(value: U256) -> Result<u128> {
    let (hi, lo) = value.into_words();
    if hi != 0 {
        return Err(overflow(value, "u128"));
    }
    Ok(lo)
}

/// Reinterpret an unsigned value as signed.
///
/// # Errors
///
/// - [`MathError::CastOverflow`] if `value > I256::MAX`
pub fn to_int256(value: U256) -> Result<I256> {
    if value > I256::MAX.as_u256() {
        return Err(overflow(value, "I256"));
    }
    Ok(value.as_i256())
}

/// Reinterpret a signed value as unsigned.
///
/// # Errors
///
/// - [`MathError::CastOverflow`] if `value` is negative
pub fn to_uint256(value: I256) -> Result<U256> {
    if value < I256::ZERO {
        return Err(overflow(value, "U256"));
    }
    Ok(value.as_u256())
}

/// Narrow a `u128` into `u64`.
///
/// # Errors
///
/// - [`MathError::CastOverflow`] if the value is out of range
pub fn u128_to_u64(value: u128) -> Result<u64> {
    u64::try_from(value).map_err(|_| overflow(value, "u64"))
}
