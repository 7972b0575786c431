//! # perp-math
//!
//! Exact integer arithmetic for the price oracle.
//!
//! All prices are carried as 256-bit unsigned integers ([`U256`]) and all
//! signed intermediates (funding rates, median inputs) as [`I256`]. Nothing in
//! this crate panics on bad input; failures come back as [`MathError`].
//!
//! ## Modules
//!
//! - [`mul_div`]: `floor(a * b / denom)` with a 512-bit intermediate
//! - [`cast`]: bounds-checked narrowing and sign conversions
//! - [`median`]: median-of-three, min/max/abs helpers

pub mod cast;
pub mod median;
pub mod mul_div;

pub use ethnum::{I256, U256};

/// 1e18, the fixed-point scale used for funding rates and ratios.
pub const WAD: U256 = U256::new(1_000_000_000_000_000_000);

/// Error types for arithmetic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    /// A divisor was zero.
    #[error("division by zero")]
    DivisionByZero,

    /// The exact result does not fit in the target width.
    #[error("arithmetic overflow")]
    Overflow,

    /// A narrowing or sign conversion lost information.
    #[error("value {value} does not fit in {target}")]
    CastOverflow {
        /// Decimal rendering of the rejected value.
        value: String,
        /// Name of the target type.
        target: &'static str,
    },
}

/// Convenience result type for arithmetic operations.
pub type Result<T> = std::result::Result<T, MathError>;
