//! A scripted node for exercising the sync engine without a network.

use crate::MirrorConfig;
use alloy_primitives::{B256, Bytes, U64, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    ops::RangeInclusive,
    time::Duration,
};
use zond_mirror_rpc::{
    BALANCE_OF_SELECTOR, CallFrame, DECIMALS_SELECTOR, LogFilter, NAME_SELECTOR, NodeClient,
    RpcBlock, RpcError, RpcLog, RpcReceipt, RpcTransaction, SYMBOL_SELECTOR,
    TOTAL_SUPPLY_SELECTOR, TRANSFER_EVENT_TOPIC,
};
use zond_mirror_storage::{BlockWriter, InMemoryStore};
use zond_mirror_types::{Address, ValidatorSnapshot};

/// Timestamp of block zero.
const GENESIS_TIME: u64 = 1_700_000_000;

/// Deterministic block hash for `number` on the branch tagged `salt`.
pub fn salted_hash(number: u64, salt: u8) -> B256 {
    let mut hash = [0u8; 32];
    hash[0] = 0xbb;
    hash[1] = salt;
    hash[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(hash)
}

/// A block without transactions.
pub fn rpc_block(number: u64, parent_hash: B256, salt: u8) -> RpcBlock {
    RpcBlock {
        number: U64::from(number),
        hash: salted_hash(number, salt),
        parent_hash,
        timestamp: U64::from(GENESIS_TIME + number * 12),
        size: U64::from(512),
        gas_used: U64::ZERO,
        gas_limit: U64::from(30_000_000),
        base_fee_per_gas: None,
        miner: None,
        transactions: Vec::new(),
    }
}

/// A value transfer with hash `0xtagtag..`.
pub fn rpc_transaction(tag: u8, from: Address, to: Option<Address>) -> RpcTransaction {
    RpcTransaction {
        hash: B256::repeat_byte(tag),
        block_number: None,
        transaction_index: None,
        from,
        to,
        nonce: U64::ZERO,
        value: U256::from(1),
        gas: U64::from(21_000),
        gas_price: Some(U256::from(1)),
        max_fee_per_gas: None,
        input: Bytes::new(),
        signature: Bytes::new(),
        public_key: Bytes::new(),
        tx_type: U64::from(2),
    }
}

/// A call frame without nested calls.
pub fn call_frame(from: Address, to: Address) -> CallFrame {
    CallFrame {
        call_type: "CALL".to_string(),
        from,
        to: Some(to),
        value: None,
        gas: U64::from(50_000),
        gas_used: U64::from(21_000),
        input: Bytes::new(),
        output: None,
        error: None,
        calls: Vec::new(),
    }
}

/// Defaults with every pause shortened so tests run instantly.
pub fn test_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.fetch.retry_backoff = Duration::from_millis(1);
    config.fetch.bulk_delay = Duration::ZERO;
    config.fetch.steady_delay = Duration::ZERO;
    config.reorg.candidate_retry_delay = Duration::ZERO;
    config.reorg.deep_reorg_pause = Duration::ZERO;
    config.supervisor.retry_backoff = Duration::from_millis(10);
    config
}

/// Persists the node's blocks in `numbers` into `store`, without receipts.
pub async fn persist_chain(node: &MockNode, store: &InMemoryStore, numbers: RangeInclusive<u64>) {
    let blocks: Vec<_> = numbers
        .filter_map(|number| node.raw_block(number))
        .filter_map(|raw| raw.into_block(HashMap::new()).ok())
        .collect();
    if let Err(err) = store.insert_blocks(&blocks) {
        panic!("failed to persist test chain: {err}");
    }
}

/// ABI encoding of a dynamic `string` return value.
fn abi_string(value: &str) -> Vec<u8> {
    let mut out = U256::from(32).to_be_bytes::<32>().to_vec();
    out.extend_from_slice(&U256::from(value.len()).to_be_bytes::<32>());
    let mut data = value.as_bytes().to_vec();
    data.resize(value.len().div_ceil(32) * 32, 0);
    out.extend(data);
    out
}

#[derive(Debug, Clone, Default)]
struct MockToken {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: Option<U256>,
    balances: HashMap<Address, U256>,
    balance_of_reverts: bool,
}

#[derive(Debug, Default)]
struct MockState {
    blocks: BTreeMap<u64, RpcBlock>,
    failures: HashMap<u64, u32>,
    stale: HashMap<u64, u32>,
    fetches: HashMap<u64, u32>,
    traces: HashMap<B256, CallFrame>,
    balances: HashMap<Address, U256>,
    logs: BTreeMap<u64, Vec<RpcLog>>,
    tokens: HashMap<Address, MockToken>,
    pending: Vec<RpcTransaction>,
    validators: ValidatorSnapshot,
    beacon_disabled: bool,
}

/// In-memory [`NodeClient`] serving a scripted chain.
///
/// Blocks can be replaced to simulate a reorg, and individual blocks can be made to fail
/// or to return a stale parent hash a set number of times.
#[derive(Debug, Default)]
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    /// A linked chain of empty blocks `0..=tip`.
    pub fn with_chain(tip: u64) -> Self {
        let node = Self::default();
        node.extend(0, tip, 0);
        node
    }

    fn extend(&self, from: u64, to: u64, salt: u8) {
        let mut state = self.state.lock();
        for number in from..=to {
            let parent_hash = match number.checked_sub(1) {
                Some(parent) => state.blocks.get(&parent).map_or(B256::ZERO, |block| block.hash),
                None => B256::ZERO,
            };
            state.blocks.insert(number, rpc_block(number, parent_hash, salt));
        }
    }

    /// Replaces every block after `fork_point` with a new branch ending at `new_tip`.
    pub fn fork_from(&self, fork_point: u64, new_tip: u64, salt: u8) {
        self.state.lock().blocks.retain(|number, _| *number <= fork_point);
        self.extend(fork_point + 1, new_tip, salt);
    }

    /// Makes the next `times` requests for block `number` time out.
    pub fn fail_block(&self, number: u64, times: u32) {
        self.state.lock().failures.insert(number, times);
    }

    /// Makes the next `times` requests for block `number` return a wrong parent hash.
    pub fn serve_stale(&self, number: u64, times: u32) {
        self.state.lock().stale.insert(number, times);
    }

    /// Number of requests made for block `number`.
    pub fn fetch_count(&self, number: u64) -> u32 {
        self.state.lock().fetches.get(&number).copied().unwrap_or_default()
    }

    /// Hash of the block the node currently serves at `number`.
    pub fn block_hash(&self, number: u64) -> Option<B256> {
        self.state.lock().blocks.get(&number).map(|block| block.hash)
    }

    /// The block the node currently serves at `number`, bypassing scripted failures.
    pub fn raw_block(&self, number: u64) -> Option<RpcBlock> {
        self.state.lock().blocks.get(&number).cloned()
    }

    /// Appends `tx` to block `number`.
    pub fn add_transaction(&self, number: u64, mut tx: RpcTransaction) {
        let mut state = self.state.lock();
        if let Some(block) = state.blocks.get_mut(&number) {
            tx.block_number = Some(U64::from(number));
            tx.transaction_index = Some(U64::from(block.transactions.len()));
            block.transactions.push(tx);
        }
    }

    /// Sets the trace returned for `hash`.
    pub fn set_trace(&self, hash: B256, frame: CallFrame) {
        self.state.lock().traces.insert(hash, frame);
    }

    /// Sets the balance returned for `address`.
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    /// Appends a `Transfer` log emitted by `contract` to block `number`.
    pub fn add_transfer_log(
        &self,
        number: u64,
        contract: Address,
        from: Address,
        to: Address,
        amount: U256,
        tx_hash: B256,
    ) {
        let mut state = self.state.lock();
        let logs = state.logs.entry(number).or_default();
        logs.push(RpcLog {
            address: contract,
            topics: vec![TRANSFER_EVENT_TOPIC, from.0.into_word(), to.0.into_word()],
            data: Bytes::from(amount.to_be_bytes::<32>().to_vec()),
            log_index: U64::from(logs.len()),
            transaction_hash: Some(tx_hash),
            block_number: Some(U64::from(number)),
        });
    }

    /// Makes `address` answer the ERC-20 metadata calls.
    pub fn deploy_token(
        &self,
        address: Address,
        name: &str,
        symbol: &str,
        decimals: u8,
        total_supply: Option<U256>,
    ) {
        let token = MockToken {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply,
            ..Default::default()
        };
        self.state.lock().tokens.insert(address, token);
    }

    /// Sets the `balanceOf` answer of `contract` for `holder`.
    pub fn set_token_balance(&self, contract: Address, holder: Address, balance: U256) {
        if let Some(token) = self.state.lock().tokens.get_mut(&contract) {
            token.balances.insert(holder, balance);
        }
    }

    /// Makes every `balanceOf` call on `contract` revert.
    pub fn revert_balance_of(&self, contract: Address) {
        if let Some(token) = self.state.lock().tokens.get_mut(&contract) {
            token.balance_of_reverts = true;
        }
    }

    /// Sets the mempool contents.
    pub fn set_pending(&self, txs: Vec<RpcTransaction>) {
        self.state.lock().pending = txs;
    }

    /// Sets the validator snapshot.
    pub fn set_validators(&self, snapshot: ValidatorSnapshot) {
        self.state.lock().validators = snapshot;
    }

    /// Behaves as if no beacon endpoint was configured.
    pub fn disable_beacon(&self) {
        self.state.lock().beacon_disabled = true;
    }
}

fn take_one(counters: &mut HashMap<u64, u32>, number: u64) -> bool {
    match counters.get_mut(&number) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().blocks.keys().next_back().copied().unwrap_or_default())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>, RpcError> {
        let mut state = self.state.lock();
        *state.fetches.entry(number).or_default() += 1;
        if take_one(&mut state.failures, number) {
            return Err(RpcError::Timeout);
        }
        let stale = take_one(&mut state.stale, number);
        Ok(state.blocks.get(&number).cloned().map(|mut block| {
            if stale {
                block.parent_hash = B256::ZERO;
            }
            block
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        let state = self.state.lock();
        let receipt = state.blocks.values().find_map(|block| {
            block.transactions.iter().any(|tx| tx.hash == hash).then(|| RpcReceipt {
                transaction_hash: hash,
                block_number: block.number,
                status: Some(U64::from(1)),
                contract_address: None,
                gas_used: U64::from(21_000),
                logs: Vec::new(),
            })
        });
        Ok(receipt)
    }

    async fn trace_transaction(&self, hash: B256) -> Result<CallFrame, RpcError> {
        let state = self.state.lock();
        Ok(state
            .traces
            .get(&hash)
            .cloned()
            .unwrap_or_else(|| call_frame(Address::ZERO, Address::ZERO)))
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        Ok(self.state.lock().balances.get(&address).copied().unwrap_or_default())
    }

    async fn nonce(&self, _address: Address) -> Result<u64, RpcError> {
        Ok(0)
    }

    async fn code(&self, _address: Address) -> Result<Bytes, RpcError> {
        Ok(Bytes::new())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let reverted =
            || RpcError::Call { code: -32000, message: "execution reverted".to_string() };
        let state = self.state.lock();
        let token = state.tokens.get(&to).ok_or_else(reverted)?;
        let selector = data.get(..4).ok_or_else(reverted)?;
        let word = |value: U256| value.to_be_bytes::<32>().to_vec();

        let response = if selector == NAME_SELECTOR.as_slice() {
            abi_string(&token.name)
        } else if selector == SYMBOL_SELECTOR.as_slice() {
            abi_string(&token.symbol)
        } else if selector == DECIMALS_SELECTOR.as_slice() {
            word(U256::from(token.decimals))
        } else if selector == TOTAL_SUPPLY_SELECTOR.as_slice() {
            word(token.total_supply.ok_or_else(reverted)?)
        } else if selector == BALANCE_OF_SELECTOR.as_slice() && !token.balance_of_reverts {
            let holder = data.get(4..36).map(B256::from_slice).ok_or_else(reverted)?;
            word(token.balances.get(&Address::from_word(holder)).copied().unwrap_or_default())
        } else {
            return Err(reverted());
        };
        Ok(Bytes::from(response))
    }

    async fn logs(&self, filter: LogFilter) -> Result<Vec<RpcLog>, RpcError> {
        let state = self.state.lock();
        let range = filter.from_block.to::<u64>()..=filter.to_block.to::<u64>();
        let topic = filter.topics.first().copied().flatten();
        Ok(state
            .logs
            .range(range)
            .flat_map(|(_, logs)| logs.iter())
            .filter(|log| topic.is_none() || log.topics.first() == topic.as_ref())
            .cloned()
            .collect())
    }

    async fn pending_transactions(&self) -> Result<Vec<RpcTransaction>, RpcError> {
        Ok(self.state.lock().pending.clone())
    }

    async fn validators(&self) -> Result<ValidatorSnapshot, RpcError> {
        let state = self.state.lock();
        if state.beacon_disabled {
            return Err(RpcError::NotConfigured("beacon"));
        }
        Ok(state.validators.clone())
    }
}
