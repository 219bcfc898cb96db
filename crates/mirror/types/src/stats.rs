//! Aggregate chain statistics.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Market data for the native coin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    /// Price in USD.
    pub price_usd: f64,
    /// Market capitalisation in USD.
    pub market_cap_usd: f64,
    /// 24h trading volume in USD.
    pub volume_usd: f64,
}

/// Periodically recomputed totals over the mirrored data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    /// Last synced block.
    pub latest_block: u64,
    /// Number of stored blocks.
    pub total_blocks: u64,
    /// Number of stored transactions.
    pub total_transactions: u64,
    /// Number of cached addresses.
    pub total_addresses: u64,
    /// Number of known contracts.
    pub total_contracts: u64,
    /// Number of addresses with a non-zero balance.
    pub funded_addresses: u64,
    /// Number of detected token contracts.
    #[serde(default)]
    pub total_tokens: u64,
    /// Native value moved by transactions in the 24 hours before the latest block.
    #[serde(default)]
    pub daily_volume: U256,
    /// Sum of every cached native balance.
    #[serde(default)]
    pub circulating_supply: U256,
    /// Market data, kept from the previous refresh when the source is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketData>,
    /// Unix time of the refresh.
    pub updated_at: u64,
}
