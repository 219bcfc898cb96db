//! The [`NodeClient`] seam and its jsonrpsee implementation.

use crate::{
    BeaconClient, CallFrame, CallRequest, DebugApiClient, LogFilter, RpcBlock, RpcError, RpcLog,
    RpcReceipt, RpcTransaction, TraceOptions, ZondApiClient,
};
use alloy_primitives::{B256, Bytes, U64, U256};
use async_trait::async_trait;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use std::{fmt::Debug, time::Duration};
use url::Url;
use zond_mirror_types::{Address, ValidatorSnapshot};

/// Block tag used for state queries.
const LATEST: &str = "latest";

/// Typed access to the node the mirror follows.
///
/// Every call either returns a typed result or an [`RpcError`]; callers decide whether to
/// retry using [`RpcError::is_retryable`]. Implementations must bound every call with a
/// timeout.
#[async_trait]
pub trait NodeClient: Debug + Send + Sync {
    /// Returns the current chain tip.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Fetches a block with full transactions.
    ///
    /// # Arguments
    ///
    /// * `number` - The block height to fetch
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the node does not have the block yet.
    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>, RpcError>;

    /// Fetches a transaction receipt.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError>;

    /// Traces a transaction with the call tracer.
    async fn trace_transaction(&self, hash: B256) -> Result<CallFrame, RpcError>;

    /// Returns the latest balance of `address`.
    async fn balance(&self, address: Address) -> Result<U256, RpcError>;

    /// Returns the latest nonce of `address`.
    async fn nonce(&self, address: Address) -> Result<u64, RpcError>;

    /// Returns the code deployed at `address`.
    async fn code(&self, address: Address) -> Result<Bytes, RpcError>;

    /// Executes a read-only call of `data` against contract `to` at the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError>;

    /// Returns the logs matching `filter`.
    async fn logs(&self, filter: LogFilter) -> Result<Vec<RpcLog>, RpcError>;

    /// Returns the current mempool contents.
    async fn pending_transactions(&self) -> Result<Vec<RpcTransaction>, RpcError>;

    /// Returns a snapshot of the validator set.
    async fn validators(&self) -> Result<ValidatorSnapshot, RpcError>;
}

/// Default timeout for node requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for creating a [`JsonRpcNodeClient`].
#[derive(Debug, Clone)]
pub struct NodeClientBuilder {
    /// Node JSON-RPC endpoint.
    pub node_url: Url,
    /// Dedicated mempool endpoint. Falls back to `node_url`.
    pub mempool_url: Option<Url>,
    /// Beacon REST endpoint used for validator snapshots.
    pub beacon_url: Option<Url>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl NodeClientBuilder {
    /// Creates a new [`NodeClientBuilder`] for the given node endpoint.
    pub const fn new(node_url: Url) -> Self {
        Self { node_url, mempool_url: None, beacon_url: None, timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    /// Sets a dedicated mempool endpoint.
    pub fn mempool_url(mut self, url: Option<Url>) -> Self {
        self.mempool_url = url;
        self
    }

    /// Sets the beacon REST endpoint.
    pub fn beacon_url(mut self, url: Option<Url>) -> Self {
        self.beacon_url = url;
        self
    }

    /// Sets the per-request timeout.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the [`JsonRpcNodeClient`].
    ///
    /// # Returns
    ///
    /// Returns the client, or an error if one of the endpoints cannot be used to build an
    /// HTTP client.
    pub fn build(self) -> Result<JsonRpcNodeClient, RpcError> {
        let build = |url: &Url| {
            HttpClientBuilder::default()
                .request_timeout(self.timeout)
                .build(url.as_str())
                .map_err(RpcError::from)
        };
        let node = build(&self.node_url)?;
        let mempool = build(self.mempool_url.as_ref().unwrap_or(&self.node_url))?;
        let beacon = self
            .beacon_url
            .clone()
            .map(|url| BeaconClient::new(url, self.timeout))
            .transpose()?;
        Ok(JsonRpcNodeClient { node, mempool, beacon })
    }
}

/// [`NodeClient`] backed by jsonrpsee HTTP clients.
///
/// Mempool queries go to the dedicated mempool endpoint when one is configured; validator
/// snapshots come from the beacon REST API.
#[derive(Debug, Clone)]
pub struct JsonRpcNodeClient {
    node: HttpClient,
    mempool: HttpClient,
    beacon: Option<BeaconClient>,
}

#[async_trait]
impl NodeClient for JsonRpcNodeClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(ZondApiClient::block_number(&self.node).await?.to::<u64>())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>, RpcError> {
        let block = self.node.get_block_by_number(U64::from(number), true).await?;
        trace!(target: "mirror::rpc", block_number = number, found = block.is_some(), "Fetched block");
        Ok(block)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        Ok(self.node.get_transaction_receipt(hash).await?)
    }

    async fn trace_transaction(&self, hash: B256) -> Result<CallFrame, RpcError> {
        Ok(DebugApiClient::trace_transaction(&self.node, hash, TraceOptions::default()).await?)
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        Ok(self.node.get_balance(address, LATEST.to_string()).await?)
    }

    async fn nonce(&self, address: Address) -> Result<u64, RpcError> {
        Ok(self.node.get_transaction_count(address, LATEST.to_string()).await?.to::<u64>())
    }

    async fn code(&self, address: Address) -> Result<Bytes, RpcError> {
        Ok(self.node.get_code(address, LATEST.to_string()).await?)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        Ok(ZondApiClient::call(&self.node, CallRequest { to, data }, LATEST.to_string()).await?)
    }

    async fn logs(&self, filter: LogFilter) -> Result<Vec<RpcLog>, RpcError> {
        Ok(self.node.get_logs(filter).await?)
    }

    async fn pending_transactions(&self) -> Result<Vec<RpcTransaction>, RpcError> {
        Ok(ZondApiClient::pending_transactions(&self.mempool).await?)
    }

    async fn validators(&self) -> Result<ValidatorSnapshot, RpcError> {
        match &self.beacon {
            Some(beacon) => beacon.validators().await,
            None => Err(RpcError::NotConfigured("beacon")),
        }
    }
}
