//! Mark price computation.
//!
//! ```text
//! projected = index * (1 + rate * next_interval / funding_period)
//! mark      = median(projected, short_window_average, previous_mark)
//! ```
//!
//! The rate is 1e18-scaled and the interval ratio is taken to 1e18 precision
//! with truncation, so `projected` is a floor approximation of the continuous
//! formula. A negative rate large enough to push the factor below zero
//! projects to zero.

use ethnum::{I256, U256};
use perp_math::cast::{to_int256, to_uint256};
use perp_math::median::{abs, median3};
use perp_math::mul_div::mul_div;
use perp_math::{MathError, WAD};
use serde::Serialize;

use crate::funding::FundingState;

/// Everything the mark price depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkInputs {
    /// Index price just pushed.
    pub index_price: U256,
    /// Funding inputs at push time.
    pub funding: FundingState,
    /// Funding period the rate refers to.
    pub funding_period: u64,
    /// Short-window average of last prices.
    pub short_window_average: U256,
    /// Mark price before this computation.
    pub previous_mark: U256,
}

/// The three median inputs and the chosen mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkComputation {
    /// Funding-adjusted index projection.
    pub projected_index: U256,
    /// Short-window last-price average.
    pub short_window_average: U256,
    /// Previous mark price.
    pub previous_mark: U256,
    /// Median of the three.
    pub mark_price: U256,
}

/// Project the index price forward by the funding rate.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `funding_period` is zero
/// - [`MathError::Overflow`] if the projection exceeds 256 bits
pub fn project_index_price(
    index_price: U256,
    funding_rate: I256,
    next_funding_interval: u64,
    funding_period: u64,
) -> Result<U256, MathError> {
    if funding_period == 0 {
        return Err(MathError::DivisionByZero);
    }

    let ratio = mul_div(
        U256::from(next_funding_interval),
        WAD,
        U256::from(funding_period),
    )?;
    let adjustment = mul_div(abs(funding_rate), ratio, WAD)?;

    let factor = if funding_rate < I256::ZERO {
        if adjustment >= WAD {
            U256::ZERO
        } else {
            WAD - adjustment
        }
    } else {
        WAD.checked_add(adjustment).ok_or(MathError::Overflow)?
    };

    mul_div(index_price, factor, WAD)
}

/// Compute the next mark price.
///
/// # Errors
///
/// - Any error of [`project_index_price`]
/// - [`MathError::CastOverflow`] if an input exceeds the signed 256-bit range
pub fn compute_mark(inputs: &MarkInputs) -> Result<MarkComputation, MathError> {
    let projected_index = project_index_price(
        inputs.index_price,
        inputs.funding.last_funding_rate,
        inputs.funding.next_funding_interval,
        inputs.funding_period,
    )?;

    let median = median3(
        to_int256(projected_index)?,
        to_int256(inputs.short_window_average)?,
        to_int256(inputs.previous_mark)?,
    );

    Ok(MarkComputation {
        projected_index,
        short_window_average: inputs.short_window_average,
        previous_mark: inputs.previous_mark,
        mark_price: to_uint256(median)?,
    })
}
