//! jsonrpsee client traits for the node namespaces the mirror calls.

use crate::{
    CallFrame, CallRequest, LogFilter, RpcBlock, RpcLog, RpcReceipt, RpcTransaction, TraceOptions,
};
use alloy_primitives::{B256, Bytes, U64, U256};
use jsonrpsee::proc_macros::rpc;
use zond_mirror_types::Address;

/// Methods of the `zond` namespace.
/// Default namespace separator is `_`.
#[rpc(client, namespace = "zond")]
pub trait ZondApi {
    /// Returns the number of the most recent block.
    #[method(name = "blockNumber")]
    async fn block_number(&self) -> RpcResult<U64>;

    /// Returns a block by number. `full` selects full transaction objects.
    #[method(name = "getBlockByNumber")]
    async fn get_block_by_number(&self, number: U64, full: bool) -> RpcResult<Option<RpcBlock>>;

    /// Returns the receipt of a mined transaction.
    #[method(name = "getTransactionReceipt")]
    async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<RpcReceipt>>;

    /// Returns the balance of `address` at `block`.
    #[method(name = "getBalance")]
    async fn get_balance(&self, address: Address, block: String) -> RpcResult<U256>;

    /// Returns the code deployed at `address` at `block`.
    #[method(name = "getCode")]
    async fn get_code(&self, address: Address, block: String) -> RpcResult<Bytes>;

    /// Returns the number of transactions sent from `address` at `block`.
    #[method(name = "getTransactionCount")]
    async fn get_transaction_count(&self, address: Address, block: String) -> RpcResult<U64>;

    /// Executes a read-only message call against `block`.
    #[method(name = "call")]
    async fn call(&self, request: CallRequest, block: String) -> RpcResult<Bytes>;

    /// Returns the logs matching `filter`.
    #[method(name = "getLogs")]
    async fn get_logs(&self, filter: LogFilter) -> RpcResult<Vec<RpcLog>>;

    /// Returns the transactions currently in the node's mempool.
    #[method(name = "pendingTransactions")]
    async fn pending_transactions(&self) -> RpcResult<Vec<RpcTransaction>>;
}

/// Methods of the `debug` namespace.
#[rpc(client, namespace = "debug")]
pub trait DebugApi {
    /// Traces a mined transaction with the given tracer.
    #[method(name = "traceTransaction")]
    async fn trace_transaction(&self, hash: B256, options: TraceOptions) -> RpcResult<CallFrame>;
}
