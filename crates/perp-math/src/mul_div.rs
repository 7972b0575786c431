//! Full-precision multiply-divide.
//!
//! Computes `floor(a * b / denom)` where the product `a * b` may need up to
//! 512 bits. The product is held as two 256-bit limbs `(hi, lo)`; the exact
//! remainder is subtracted so the 512-bit value becomes divisible by `denom`,
//! powers of two are shifted out of `denom`, and the remaining odd factor is
//! divided out by multiplying with its inverse modulo 2^256.
//!
//! ```text
//! denom = 2^k * d        (d odd)
//! q     = ((a*b - r) >> k) * d^-1   (mod 2^256)
//! ```

use crate::{MathError, Result, U256};

/// Multiply two 256-bit values into a 512-bit product `(hi, lo)`.
pub fn full_mul(a: U256, b: U256) -> (U256, U256) {
    let (a_hi, a_lo) = a.into_words();
    let (b_hi, b_lo) = b.into_words();

    // Four 128x128 partial products, each fits in 256 bits.
    let ll = U256::new(a_lo) * U256::new(b_lo);
    let lh = U256::new(a_lo) * U256::new(b_hi);
    let hl = U256::new(a_hi) * U256::new(b_lo);
    let hh = U256::new(a_hi) * U256::new(b_hi);

    let (lh_hi, lh_lo) = lh.into_words();
    let (hl_hi, hl_lo) = hl.into_words();

    let (lo, carry_a) = ll.overflowing_add(U256::from_words(lh_lo, 0));
    let (lo, carry_b) = lo.overflowing_add(U256::from_words(hl_lo, 0));

    // The true product is below 2^512, so the high limb cannot wrap.
    let carries = u128::from(carry_a) + u128::from(carry_b);
    let hi = hh
        .wrapping_add(U256::new(lh_hi))
        .wrapping_add(U256::new(hl_hi))
        .wrapping_add(U256::new(carries));

    (hi, lo)
}

/// `(x + y) mod m` for `x, y < m`, without overflowing.
fn add_mod(x: U256, y: U256, m: U256) -> U256 {
    let (sum, overflow) = x.overflowing_add(y);
    if overflow || sum >= m {
        sum.wrapping_sub(m)
    } else {
        sum
    }
}

/// `(a * b) mod m` computed by double-and-add.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `m` is zero
pub fn mul_mod(a: U256, b: U256, m: U256) -> Result<U256> {
    if m == U256::ZERO {
        return Err(MathError::DivisionByZero);
    }

    let a = a % m;
    let bits = 256 - b.leading_zeros();
    let mut acc = U256::ZERO;
    for i in (0..bits).rev() {
        acc = add_mod(acc, acc, m);
        if (b >> i) & U256::ONE != U256::ZERO {
            acc = add_mod(acc, a, m);
        }
    }
    Ok(acc)
}

/// Inverse of an odd `d` modulo 2^256.
///
/// Seeded with `(3 * d) ^ 2`, which is correct to 4 bits; each Newton step
/// doubles the number of correct bits, so six steps reach 256.
fn inverse_mod_2_256(d: U256) -> U256 {
    let two = U256::new(2);
    let mut inv = d.wrapping_mul(U256::new(3)) ^ two;
    for _ in 0..6 {
        inv = inv.wrapping_mul(two.wrapping_sub(d.wrapping_mul(inv)));
    }
    inv
}

/// Compute `floor(a * b / denom)` without losing precision.
///
/// # Errors
///
/// - [`MathError::DivisionByZero`] if `denom` is zero
/// - [`MathError::Overflow`] if the quotient does not fit in 256 bits
///
/// # Examples
///
/// ```
/// use perp_math::{mul_div::mul_div, U256};
///
/// // (2^255 * 6) / 4 = 3 * 2^254, although the product needs 258 bits.
/// let a = U256::ONE << 255u32;
/// let q = mul_div(a, U256::new(6), U256::new(4)).expect("fits");
/// assert_eq!(q, U256::new(3) << 254u32);
/// ```
pub fn mul_div(a: U256, b: U256, denom: U256) -> Result<U256> {
    if denom == U256::ZERO {
        return Err(MathError::DivisionByZero);
    }

    let (prod1, prod0) = full_mul(a, b);

    // Product fits in 256 bits: plain division.
    if prod1 == U256::ZERO {
        return Ok(prod0 / denom);
    }

    // Quotient would need more than 256 bits.
    if denom <= prod1 {
        return Err(MathError::Overflow);
    }

    // Make the 512-bit product exactly divisible by denom.
    let remainder = mul_mod(a, b, denom)?;
    let prod1 = if remainder > prod0 {
        prod1.wrapping_sub(U256::ONE)
    } else {
        prod1
    };
    let prod0 = prod0.wrapping_sub(remainder);

    // Factor powers of two out of denom and shift them out of the product.
    let shift = denom.trailing_zeros();
    let odd = denom >> shift;
    let mut prod0 = prod0 >> shift;
    if shift > 0 {
        prod0 = prod0 | (prod1 << (256 - shift));
    }

    // Exact division by the odd factor is multiplication by its inverse.
    Ok(prod0.wrapping_mul(inverse_mod_2_256(odd)))
}
