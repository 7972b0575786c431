//! Median-of-three and small comparison helpers.

use crate::{I256, U256};

/// Middle value of three.
///
/// Compare-and-branch form: with duplicates it returns one of the equal
/// values, e.g. `median3(a, a, b) == a`.
///
/// # Examples
///
/// ```
/// use perp_math::median::median3;
///
/// assert_eq!(median3(3, 1, 2), 2);
/// assert_eq!(median3(5, 5, 1), 5);
/// ```
pub fn median3<T: Ord + Copy>(a: T, b: T, c: T) -> T {
    let lo = a.min(b);
    let hi = a.max(b);
    // c below the pair -> lo; above -> hi; in between -> c.
    lo.max(hi.min(c))
}

/// Absolute value of a signed 256-bit integer.
///
/// Total: `|I256::MIN| = 2^255` fits in `U256`.
pub fn abs(value: I256) -> U256 {
    if value < I256::ZERO {
        I256::ZERO.wrapping_sub(value).as_u256()
    } else {
        value.as_u256()
    }
}

/// Largest of three.
pub fn max3<T: Ord>(a: T, b: T, c: T) -> T {
    a.max(b).max(c)
}

/// Smallest of three.
pub fn min3<T: Ord>(a: T, b: T, c: T) -> T {
    a.min(b).min(c)
}
