//! Property tests for the arithmetic kernel.

use perp_math::cast::{to_int256, to_u128, to_uint256};
use perp_math::median::{max3, median3, min3};
use perp_math::mul_div::{full_mul, mul_div};
use perp_math::{MathError, I256, U256};
use proptest::prelude::*;

// ============================================================================
// Reference arithmetic
// ============================================================================

fn limbs(x: U256) -> [u64; 4] {
    let mut out = [0u64; 4];
    for (i, limb) in out.iter_mut().enumerate() {
        let (_, lo) = (x >> (64 * i as u32)).into_words();
        *limb = lo as u64;
    }
    out
}

/// Schoolbook 512-bit product on 64-bit limbs.
fn schoolbook_mul(a: U256, b: U256) -> [u64; 8] {
    let a = limbs(a);
    let b = limbs(b);
    let mut out = [0u64; 8];
    for i in 0..4 {
        let mut carry: u128 = 0;
        for j in 0..4 {
            let cur = out[i + j] as u128 + (a[i] as u128) * (b[j] as u128) + carry;
            out[i + j] = cur as u64;
            carry = cur >> 64;
        }
        out[i + 4] = carry as u64;
    }
    out
}

/// Bit-by-bit long division of a 512-bit product. `None` if the quotient
/// needs more than 256 bits.
fn reference_mul_div(a: U256, b: U256, denom: U256) -> Option<U256> {
    let product = schoolbook_mul(a, b);
    let mut rem = U256::ZERO;
    let mut quot = U256::ZERO;
    for bit in (0..512u32).rev() {
        let carry = rem >> 255u32 == U256::ONE;
        let next = (product[(bit / 64) as usize] >> (bit % 64)) & 1;
        rem = (rem << 1u32) | U256::new(next as u128);
        if carry || rem >= denom {
            rem = rem.wrapping_sub(denom);
            if bit >= 256 {
                return None;
            }
            quot = quot | (U256::ONE << bit);
        }
    }
    Some(quot)
}

fn xor_median(a: I256, b: I256, c: I256) -> I256 {
    let bits = max3(a, b, c).as_u256()
        ^ min3(a, b, c).as_u256()
        ^ a.as_u256()
        ^ b.as_u256()
        ^ c.as_u256();
    bits.as_i256()
}

// ============================================================================
// Strategies
// ============================================================================

fn any_u256() -> impl Strategy<Value = U256> {
    (any::<u128>(), any::<u128>()).prop_map(|(hi, lo)| U256::from_words(hi, lo))
}

/// Values with a random bit length, so small and large magnitudes both show up.
fn sized_u256() -> impl Strategy<Value = U256> {
    (any_u256(), 0u32..256).prop_map(|(v, shift)| v >> shift)
}

fn any_i256() -> impl Strategy<Value = I256> {
    any_u256().prop_map(|v| v.as_i256())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_full_mul_matches_schoolbook(a in any_u256(), b in any_u256()) {
        let (hi, lo) = full_mul(a, b);
        let expected = schoolbook_mul(a, b);
        prop_assert_eq!(limbs(lo), [expected[0], expected[1], expected[2], expected[3]]);
        prop_assert_eq!(limbs(hi), [expected[4], expected[5], expected[6], expected[7]]);
    }

    #[test]
    fn prop_mul_div_matches_reference(
        a in sized_u256(),
        b in sized_u256(),
        denom in sized_u256().prop_filter("non-zero", |d| *d != U256::ZERO),
    ) {
        match (mul_div(a, b, denom), reference_mul_div(a, b, denom)) {
            (Ok(q), Some(expected)) => prop_assert_eq!(q, expected),
            (Err(MathError::Overflow), None) => {}
            (got, expected) => prop_assert!(false, "mul_div {:?} vs reference {:?}", got, expected),
        }
    }

    #[test]
    fn prop_mul_div_wide_products(
        a in any_u256().prop_map(|a| a | (U256::ONE << 200u32)),
        b in any_u256().prop_map(|b| b | (U256::ONE << 200u32)),
        denom in any_u256().prop_map(|d| d | (U256::ONE << 250u32)),
    ) {
        // a * b overflows 256 bits in every case here.
        let (hi, _) = full_mul(a, b);
        prop_assert!(hi != U256::ZERO);
        let expected = reference_mul_div(a, b, denom);
        match mul_div(a, b, denom) {
            Ok(q) => prop_assert_eq!(Some(q), expected),
            Err(e) => {
                prop_assert_eq!(e, MathError::Overflow);
                prop_assert_eq!(expected, None);
            }
        }
    }

    #[test]
    fn prop_median_symmetric(a in any_i256(), b in any_i256(), c in any_i256()) {
        let m = median3(a, b, c);
        prop_assert_eq!(m, median3(c, b, a));
        prop_assert_eq!(m, median3(b, a, c));
        prop_assert_eq!(m, median3(a, c, b));
        prop_assert_eq!(m, median3(b, c, a));
        prop_assert_eq!(m, median3(c, a, b));

        let mut sorted = [a, b, c];
        sorted.sort();
        prop_assert_eq!(m, sorted[1]);
    }

    #[test]
    fn prop_median_with_duplicates(a in any_i256(), b in any_i256()) {
        prop_assert_eq!(median3(a, a, b), a);
        prop_assert_eq!(median3(a, b, a), a);
        prop_assert_eq!(median3(b, a, a), a);
    }

    #[test]
    fn prop_xor_identity_agrees(a in any_i256(), b in any_i256(), c in any_i256()) {
        prop_assert_eq!(xor_median(a, b, c), median3(a, b, c));
        prop_assert_eq!(xor_median(a, a, c), median3(a, a, c));
        prop_assert_eq!(xor_median(a, b, b), median3(a, b, b));
        prop_assert_eq!(xor_median(c, c, c), c);
    }

    #[test]
    fn prop_sign_casts(v in any_u256()) {
        match to_int256(v) {
            Ok(signed) => prop_assert_eq!(to_uint256(signed).expect("round trip"), v),
            Err(_) => prop_assert!(v > I256::MAX.as_u256()),
        }
    }

    #[test]
    fn prop_to_u128_exact(v in sized_u256()) {
        match to_u128(v) {
            Ok(n) => prop_assert_eq!(U256::new(n), v),
            Err(_) => prop_assert!(v > U256::new(u128::MAX)),
        }
    }
}
