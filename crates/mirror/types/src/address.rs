//! Zond account addresses and the cached per-address state.

use alloy_primitives::{B256, U256};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 20-byte Zond account address.
///
/// Rendered with the network's `Z` prefix. Parsing also accepts the `0x` prefix some
/// node versions still emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub alloy_primitives::Address);

/// Error returned when an address string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {0}")]
pub struct AddressParseError(pub String);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self(alloy_primitives::Address::ZERO);

    /// Creates an address from raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(alloy_primitives::Address::new(bytes))
    }

    /// Builds an address from the low 20 bytes of a 32-byte word, as found in log topics.
    pub fn from_word(word: B256) -> Self {
        Self(alloy_primitives::Address::from_word(word))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Z{}", alloy_primitives::hex::encode(self.0.as_slice()))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('Z')
            .or_else(|| s.strip_prefix('z'))
            .or_else(|| s.strip_prefix("0x"))
            .unwrap_or(s);
        let bytes: [u8; 20] = alloy_primitives::hex::decode(digits)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        Ok(Self::new(bytes))
    }
}

impl From<alloy_primitives::Address> for Address {
    fn from(inner: alloy_primitives::Address) -> Self {
        Self(inner)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Cached balance and contract flag for an address.
///
/// This is derived state rebuilt from balance queries and never the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    /// The address.
    pub id: Address,
    /// Last observed balance.
    pub balance: U256,
    /// Last observed nonce.
    pub nonce: u64,
    /// Whether code has ever been observed at this address.
    pub is_contract: bool,
}

impl AddressRecord {
    /// Merges a freshly queried record with the previously cached one.
    ///
    /// `is_contract` is sticky: once an address is known to be a contract it stays one.
    pub fn merge(mut self, previous: Option<&Self>) -> Self {
        if let Some(previous) = previous {
            self.is_contract |= previous.is_contract;
            self.nonce = self.nonce.max(previous.nonce);
        }
        self
    }
}

/// Index entry linking an address to a transaction it participated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressTransaction {
    /// The participating address.
    pub address: Address,
    /// The transaction hash.
    pub tx_hash: B256,
    /// Block containing the transaction.
    pub block_number: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// Whether the address was the sender.
    pub outgoing: bool,
}
