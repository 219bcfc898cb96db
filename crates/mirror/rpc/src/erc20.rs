//! ERC-20 call data and return data.
//!
//! Return values are decoded leniently. Tokens that answer `name()` or `symbol()` with a
//! `bytes32` instead of a dynamic `string` are accepted.

use alloy_primitives::{Bytes, Selector, U256, fixed_bytes};
use zond_mirror_types::Address;

/// `name()`.
pub const NAME_SELECTOR: Selector = fixed_bytes!("06fdde03");
/// `symbol()`.
pub const SYMBOL_SELECTOR: Selector = fixed_bytes!("95d89b41");
/// `decimals()`.
pub const DECIMALS_SELECTOR: Selector = fixed_bytes!("313ce567");
/// `totalSupply()`.
pub const TOTAL_SUPPLY_SELECTOR: Selector = fixed_bytes!("18160ddd");
/// `balanceOf(address)`.
pub const BALANCE_OF_SELECTOR: Selector = fixed_bytes!("70a08231");

const WORD: usize = 32;

/// Call data for a function without arguments.
pub fn selector_call(selector: Selector) -> Bytes {
    Bytes::copy_from_slice(selector.as_slice())
}

/// Call data for `balanceOf(holder)`.
pub fn balance_of_call(holder: Address) -> Bytes {
    let mut data = Vec::with_capacity(BALANCE_OF_SELECTOR.len() + WORD);
    data.extend_from_slice(BALANCE_OF_SELECTOR.as_slice());
    data.extend_from_slice(holder.0.into_word().as_slice());
    data.into()
}

/// Decodes the first word of `data` as an unsigned integer.
pub fn decode_uint(data: &[u8]) -> Option<U256> {
    data.get(..WORD).map(U256::from_be_slice)
}

/// Decodes a `uint8` return value.
pub fn decode_decimals(data: &[u8]) -> Option<u8> {
    let value = decode_uint(data)?;
    (value <= U256::from(u8::MAX)).then(|| value.to::<u8>())
}

/// Decodes a `string` return value, falling back to a zero-padded `bytes32`.
///
/// Empty and all-zero responses yield `None`.
pub fn decode_string(data: &[u8]) -> Option<String> {
    if data.iter().all(|byte| *byte == 0) {
        return None;
    }
    dynamic_string(data).or_else(|| fixed_string(data))
}

fn dynamic_string(data: &[u8]) -> Option<String> {
    let offset = word_as_usize(data, 0)?;
    let len = word_as_usize(data, offset)?;
    let start = offset.checked_add(WORD)?;
    let bytes = data.get(start..start.checked_add(len)?)?;
    let value = String::from_utf8(bytes.to_vec()).ok()?;
    (!value.is_empty()).then_some(value)
}

fn fixed_string(data: &[u8]) -> Option<String> {
    let word = data.get(..WORD)?;
    let end = word.iter().rposition(|byte| *byte != 0)? + 1;
    let value = std::str::from_utf8(&word[..end]).ok()?;
    (!value.chars().any(char::is_control)).then(|| value.to_owned())
}

fn word_as_usize(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(WORD)?)?;
    let value = U256::from_be_slice(word);
    if value > U256::from(u32::MAX) {
        return None;
    }
    usize::try_from(value.to::<u64>()).ok()
}
