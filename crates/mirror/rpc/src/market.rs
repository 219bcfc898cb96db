//! Market data for the native coin.

use crate::RpcError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;
use zond_mirror_types::MarketData;

#[derive(Debug, Deserialize)]
struct UsdValue {
    #[serde(default)]
    usd: f64,
}

#[derive(Debug, Deserialize)]
struct MarketDataBody {
    current_price: UsdValue,
    market_cap: UsdValue,
    #[serde(default)]
    total_volume: Option<UsdValue>,
}

/// Response of a CoinGecko-style `coins/{id}` endpoint.
#[derive(Debug, Deserialize)]
pub struct MarketResponse {
    market_data: MarketDataBody,
}

impl From<MarketResponse> for MarketData {
    fn from(response: MarketResponse) -> Self {
        let body = response.market_data;
        Self {
            price_usd: body.current_price.usd,
            market_cap_usd: body.market_cap.usd,
            volume_usd: body.total_volume.map(|v| v.usd).unwrap_or_default(),
        }
    }
}

/// Fetches [`MarketData`] from a configured HTTP endpoint.
#[derive(Debug, Clone)]
pub struct MarketClient {
    client: reqwest::Client,
    url: Url,
}

impl MarketClient {
    /// Creates a client for `url`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self { client: reqwest::Client::builder().timeout(timeout).build()?, url })
    }

    /// Fetches the current market data.
    pub async fn market_data(&self) -> Result<MarketData, RpcError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::HttpStatus(status.as_u16()));
        }
        Ok(response.json::<MarketResponse>().await?.into())
    }
}
