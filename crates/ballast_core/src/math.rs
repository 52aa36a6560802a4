//! Fixed-point arithmetic on 18-decimal integers
//!
//! Amounts, prices and ratios are plain `u128` values scaled by
//! [`DECIMAL_PRECISION`]. Products that can exceed 128 bits go through a
//! 256-bit intermediate. Nothing here saturates silently: a would-be negative
//! or overflowing result is an [`EngineError`] of kind `ArithmeticGuard`.

use crate::error::{EngineError, EngineResult};
use primitive_types::U256;

/// 1.0 in 18-decimal fixed point
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Precision of the nominal collateral ratio used as the sort key
pub const NICR_PRECISION: u128 = 100 * DECIMAL_PRECISION;

/// Exponent cap for [`dec_pow`]: 1000 years worth of minutes
pub const MAX_DECAY_MINUTES: u64 = 525_600_000;

/// Whole units to fixed point
pub const fn wad(units: u128) -> u128 {
    units * DECIMAL_PRECISION
}

/// Percentage to fixed point, e.g. `percent(110)` is 1.1
pub const fn percent(p: u128) -> u128 {
    p * (DECIMAL_PRECISION / 100)
}

/// Checked add
pub fn add(a: u128, b: u128) -> EngineResult<u128> {
    a.checked_add(b).ok_or(EngineError::Overflow)
}

/// Checked subtract, `context` names the balance that would go negative
pub fn sub(a: u128, b: u128, context: &'static str) -> EngineResult<u128> {
    a.checked_sub(b).ok_or(EngineError::Underflow(context))
}

/// Narrow a 256-bit intermediate back to u128
pub fn to_u128(x: U256) -> EngineResult<u128> {
    if x > U256::from(u128::MAX) {
        return Err(EngineError::Overflow);
    }
    Ok(x.as_u128())
}

/// `a * b / denom`, rounded down
pub fn mul_div(a: u128, b: u128, denom: u128) -> EngineResult<u128> {
    if denom == 0 {
        return Err(EngineError::DivisionByZero);
    }
    to_u128(U256::from(a) * U256::from(b) / U256::from(denom))
}

/// `a * b / denom`, rounded up
pub fn mul_div_up(a: u128, b: u128, denom: u128) -> EngineResult<u128> {
    if denom == 0 {
        return Err(EngineError::DivisionByZero);
    }
    let denom = U256::from(denom);
    let product = U256::from(a) * U256::from(b);
    let (q, r) = product.div_mod(denom);
    let q = if r.is_zero() { q } else { q + U256::one() };
    to_u128(q)
}

/// Fixed-point multiply, rounding half up
pub fn dec_mul(x: u128, y: u128) -> EngineResult<u128> {
    let prod = U256::from(x) * U256::from(y) + U256::from(DECIMAL_PRECISION / 2);
    to_u128(prod / U256::from(DECIMAL_PRECISION))
}

/// `base ^ minutes` for a fixed-point base, by repeated squaring.
///
/// The exponent is capped at [`MAX_DECAY_MINUTES`]; for a base below 1.0 the
/// result has long since reached 0 by then.
pub fn dec_pow(base: u128, minutes: u64) -> EngineResult<u128> {
    let mut n = minutes.min(MAX_DECAY_MINUTES);
    if n == 0 {
        return Ok(DECIMAL_PRECISION);
    }

    let mut x = base;
    let mut y = DECIMAL_PRECISION;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x)?;
            n /= 2;
        } else {
            y = dec_mul(x, y)?;
            x = dec_mul(x, x)?;
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

/// Collateral ratio `coll * price / debt`; `u128::MAX` when there is no debt
pub fn compute_cr(coll: u128, debt: u128, price: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(coll, price, debt).unwrap_or(u128::MAX)
}

/// Price-independent ratio `coll * 1e20 / debt`; `u128::MAX` when there is no debt
pub fn compute_nominal_cr(coll: u128, debt: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(coll, NICR_PRECISION, debt).unwrap_or(u128::MAX)
}

/// Parse a decimal string such as `"1250.5"` into fixed point
pub fn parse_wad(s: &str) -> Option<u128> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.len() > 18 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let int_value: u128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac_value: u128 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };
    for _ in frac_part.len()..18 {
        frac_value *= 10;
    }

    int_value
        .checked_mul(DECIMAL_PRECISION)?
        .checked_add(frac_value)
}

/// Render fixed point as a decimal string, trailing zeros trimmed
pub fn format_wad(x: u128) -> String {
    let int_part = x / DECIMAL_PRECISION;
    let frac_part = x % DECIMAL_PRECISION;
    if frac_part == 0 {
        return int_part.to_string();
    }
    let frac = format!("{:018}", frac_part);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}
