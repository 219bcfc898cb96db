//! Helpers for the `0x`-prefixed hex quantities used on the node boundary and in the
//! persisted sync-state document.
//!
//! Quantities are always rendered in canonical form: lowercase, no leading zeros, and
//! `0x0` for zero. Parsing is lenient about the prefix so that values written by older
//! tooling without it are still accepted.

use core::cmp::Ordering;
use num_bigint::BigUint;
use num_traits::Num;

/// Errors returned when parsing hex quantities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    /// The input had no digits after the optional prefix.
    #[error("empty hex quantity")]
    Empty,
    /// The input contained a non-hex character.
    #[error("invalid hex quantity: {0}")]
    InvalidDigit(String),
    /// The value does not fit in 64 bits.
    #[error("hex quantity overflows u64: {0}")]
    Overflow(String),
}

fn strip_prefix(s: &str) -> Result<&str, HexError> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return Err(HexError::Empty);
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HexError::InvalidDigit(s.to_string()));
    }
    Ok(digits)
}

/// Parses a hex quantity into a `u64`.
pub fn parse_quantity(s: &str) -> Result<u64, HexError> {
    let digits = strip_prefix(s)?;
    let significant = digits.trim_start_matches('0');
    if significant.len() > 16 {
        return Err(HexError::Overflow(s.to_string()));
    }
    if significant.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(significant, 16).map_err(|_| HexError::InvalidDigit(s.to_string()))
}

/// Parses a hex quantity of arbitrary width.
pub fn parse_big_quantity(s: &str) -> Result<BigUint, HexError> {
    let digits = strip_prefix(s)?;
    BigUint::from_str_radix(digits, 16).map_err(|_| HexError::InvalidDigit(s.to_string()))
}

/// Renders `n` as a canonical hex quantity.
pub fn to_quantity(n: u64) -> String {
    format!("{n:#x}")
}

/// Renders an arbitrary-width value as a canonical hex quantity.
pub fn big_to_quantity(n: &BigUint) -> String {
    format!("0x{}", n.to_str_radix(16))
}

/// Compares two hex quantities numerically.
pub fn compare_quantities(a: &str, b: &str) -> Result<Ordering, HexError> {
    Ok(parse_big_quantity(a)?.cmp(&parse_big_quantity(b)?))
}

/// Adds `delta` to a hex quantity, returning the canonical result.
pub fn add_quantity(a: &str, delta: u64) -> Result<String, HexError> {
    let n = parse_quantity(a)?;
    n.checked_add(delta).map(to_quantity).ok_or_else(|| HexError::Overflow(a.to_string()))
}

/// Subtracts `delta` from a hex quantity, saturating at zero.
pub fn sub_quantity(a: &str, delta: u64) -> Result<String, HexError> {
    Ok(to_quantity(parse_quantity(a)?.saturating_sub(delta)))
}
