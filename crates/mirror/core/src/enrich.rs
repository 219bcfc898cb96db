//! Per-block enrichment run after a block is persisted.
//!
//! Every step is best-effort. A failed step is logged and counted, and never blocks sync
//! progress.

use crate::{
    EnrichError, Metrics, TokenMetadata, apply_transfers, balance_of,
    ots::{BitStatus, OtsBitfield, OtsPage, locate, ots_key_index},
};
use alloy_primitives::{B256, U256};
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::{collections::BTreeSet, sync::Arc};
use zond_mirror_rpc::{CallFrame, LogFilter, NodeClient, RpcLog, TRANSFER_EVENT_TOPIC};
use zond_mirror_storage::MirrorStore;
use zond_mirror_types::{
    Address, AddressRecord, AddressTransaction, Block, ContractRecord, InternalCall,
    OtsReuseEvent, PendingStatus, TokenBalance, TokenTransfer, Transaction, unix_now,
};

/// Outcome of enriching one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    /// Steps that failed.
    pub failed_steps: u32,
    /// Key index reuses detected.
    pub ots_reuses: u32,
}

/// Derives secondary records from persisted blocks.
#[derive(Debug)]
pub struct Enricher<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    ots: Arc<Mutex<OtsBitfield>>,
}

impl<C, S> Clone for Enricher<C, S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            ots: Arc::clone(&self.ots),
        }
    }
}

impl<C, S> Enricher<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`Enricher`] with an empty key-index tracker.
    pub fn new(client: Arc<C>, store: Arc<S>) -> Self {
        Self { client, store, ots: Arc::new(Mutex::new(OtsBitfield::new())) }
    }

    /// Runs every enrichment step for `block`.
    pub async fn enrich_block(&self, block: &Block) -> EnrichReport {
        let mut report = EnrichReport::default();
        let mut note = |step: &'static str, result: Result<(), EnrichError>| {
            if let Err(err) = result {
                report.failed_steps += 1;
                metrics::counter!(Metrics::ENRICHMENT_ERRORS, "step" => step).increment(1);
                warn!(target: "mirror::enrich", block_number = block.number, step, %err, "Enrichment step failed");
            }
        };

        note("address_index", self.index_addresses(block));
        for tx in &block.transactions {
            note("contract", self.record_contract(block, tx).await);
            note("internal_calls", self.record_internal_calls(block, tx).await);
        }
        note("balances", self.refresh_balances(block).await);
        let transfers = match self.record_token_transfers(block).await {
            Ok(transfers) => transfers,
            Err(err) => {
                note("token_transfers", Err(err));
                Vec::new()
            }
        };
        if !transfers.is_empty() {
            note("token_contracts", self.record_token_contracts(&transfers).await);
            note("token_balances", self.refresh_token_balances(block, &transfers).await);
        }
        note("pending", self.settle_pending(block));

        for tx in &block.transactions {
            if self.track_ots(block, tx).is_reuse() {
                report.ots_reuses += 1;
            }
        }

        report
    }

    /// Returns `true` if the tracker has seen `index` for `address`.
    pub fn ots_is_set(&self, address: &Address, index: &BigUint) -> bool {
        self.ots.lock().is_set(address, index)
    }

    fn index_addresses(&self, block: &Block) -> Result<(), EnrichError> {
        let entries: Vec<_> = block
            .transactions
            .iter()
            .flat_map(|tx| {
                let outgoing = AddressTransaction {
                    address: tx.from,
                    tx_hash: tx.hash,
                    block_number: block.number,
                    timestamp: block.timestamp,
                    outgoing: true,
                };
                let incoming = tx.to.or(tx.contract_address).map(|to| AddressTransaction {
                    address: to,
                    outgoing: false,
                    ..outgoing.clone()
                });
                core::iter::once(outgoing).chain(incoming)
            })
            .collect();
        if !entries.is_empty() {
            self.store.insert_address_transactions(&entries)?;
        }
        Ok(())
    }

    async fn record_contract(&self, block: &Block, tx: &Transaction) -> Result<(), EnrichError> {
        let Some(address) = tx.contract_address.filter(|_| tx.is_contract_creation()) else {
            return Ok(());
        };
        let code = self.client.code(address).await?;
        self.store.upsert_contract(ContractRecord {
            address,
            creator: tx.from,
            creation_tx: tx.hash,
            block_number: block.number,
            code_size: code.len() as u64,
            success: !code.is_empty(),
        })?;
        Ok(())
    }

    async fn refresh_balances(&self, block: &Block) -> Result<(), EnrichError> {
        let touched: BTreeSet<Address> =
            block.transactions.iter().flat_map(|tx| tx.touched_addresses()).collect();
        let created: BTreeSet<Address> =
            block.transactions.iter().filter_map(|tx| tx.contract_address).collect();

        for address in touched {
            let (balance, nonce) =
                tokio::try_join!(self.client.balance(address), self.client.nonce(address))?;
            let previous = self.store.address(&address)?;
            let known_contract = created.contains(&address) ||
                previous.as_ref().is_some_and(|record| record.is_contract) ||
                self.store.contract(&address)?.is_some();
            let record = AddressRecord { id: address, balance, nonce, is_contract: known_contract };
            self.store.upsert_address(record.merge(previous.as_ref()))?;
        }
        Ok(())
    }

    async fn record_internal_calls(&self, block: &Block, tx: &Transaction) -> Result<(), EnrichError> {
        if tx.input.is_empty() && !tx.is_contract_creation() {
            return Ok(());
        }
        let root = self.client.trace_transaction(tx.hash).await?;
        let mut calls = Vec::new();
        flatten_calls(&root.calls, &mut Vec::new(), tx.hash, block, &mut calls);
        if !calls.is_empty() {
            self.store.insert_internal_calls(&calls)?;
        }
        Ok(())
    }

    async fn record_token_transfers(&self, block: &Block) -> Result<Vec<TokenTransfer>, EnrichError> {
        if block.transactions.is_empty() {
            return Ok(Vec::new());
        }
        let logs = self.client.logs(LogFilter::transfers_in_block(block.number)).await?;
        let transfers: Vec<_> =
            logs.iter().filter_map(|log| token_transfer(log, block)).collect();
        if !transfers.is_empty() {
            debug!(target: "mirror::enrich", block_number = block.number, count = transfers.len(), "Recorded token transfers");
            self.store.insert_token_transfers(&transfers)?;
        }
        Ok(transfers)
    }

    /// Stores metadata for contracts seen in `transfers` for the first time.
    async fn record_token_contracts(&self, transfers: &[TokenTransfer]) -> Result<(), EnrichError> {
        let mut checked = BTreeSet::new();
        for transfer in transfers {
            if !checked.insert(transfer.contract) ||
                self.store.token_contract(&transfer.contract)?.is_some()
            {
                continue;
            }
            let Some(metadata) = TokenMetadata::fetch(&*self.client, transfer.contract).await else {
                trace!(target: "mirror::enrich", contract = %transfer.contract, "Contract does not answer like a token");
                continue;
            };
            info!(
                target: "mirror::enrich",
                contract = %transfer.contract,
                symbol = %metadata.symbol,
                decimals = metadata.decimals,
                "Detected token contract"
            );
            metrics::counter!(Metrics::TOKENS_DETECTED).increment(1);
            self.store.upsert_token_contract(metadata.into_record(transfer))?;
        }
        Ok(())
    }

    /// Refreshes the balance of every holder touched by `transfers` of a known token.
    ///
    /// The zero address is skipped. When `balanceOf` cannot be read, the block's transfers
    /// are applied to the stored balance instead.
    async fn refresh_token_balances(
        &self,
        block: &Block,
        transfers: &[TokenTransfer],
    ) -> Result<(), EnrichError> {
        let holders: BTreeSet<(Address, Address)> = transfers
            .iter()
            .flat_map(|transfer| [(transfer.contract, transfer.from), (transfer.contract, transfer.to)])
            .filter(|(_, holder)| *holder != Address::ZERO)
            .collect();

        for (contract, holder) in holders {
            if self.store.token_contract(&contract)?.is_none() {
                continue;
            }
            let balance = match balance_of(&*self.client, contract, holder).await {
                Some(balance) => balance,
                None => {
                    let previous = self
                        .store
                        .token_balance(&contract, &holder)?
                        .map_or(U256::ZERO, |entry| entry.balance);
                    debug!(target: "mirror::enrich", %contract, %holder, "balanceOf unavailable, applying transfer amounts");
                    apply_transfers(previous, transfers, contract, holder)
                }
            };
            self.store.upsert_token_balance(TokenBalance {
                contract,
                holder,
                balance,
                block_number: block.number,
                updated_at: unix_now(),
            })?;
        }
        Ok(())
    }

    fn settle_pending(&self, block: &Block) -> Result<(), EnrichError> {
        let now = unix_now();
        for tx in &block.transactions {
            if let Some(mut pending) = self.store.pending(tx.hash)? {
                if pending.status != PendingStatus::Mined {
                    pending.mark_mined(block.number, now);
                    self.store.upsert_pending(pending)?;
                }
            }
        }
        Ok(())
    }

    /// Marks the key index used by `tx` and raises an alert on reuse.
    fn track_ots(&self, block: &Block, tx: &Transaction) -> BitStatus {
        let Some(index) = ots_key_index(&tx.signature) else {
            return BitStatus::NewlySet;
        };
        let (key, _) = locate(&index);

        let (status, page) = {
            let mut ots = self.ots.lock();
            if !ots.has_page(&tx.from, &key) {
                match self.store.ots_page(&tx.from, key.as_bytes()) {
                    Ok(Some(bytes)) => match OtsPage::from_bytes(&bytes) {
                        Some(page) => ots.load_page(tx.from, key.clone(), page),
                        None => warn!(target: "mirror::ots", address = %tx.from, "Ignoring stored page with unexpected length"),
                    },
                    Ok(None) => {}
                    Err(err) => warn!(target: "mirror::ots", address = %tx.from, %err, "Failed to load page"),
                }
            }
            let status = ots.set(tx.from, &index);
            (status, ots.page(&tx.from, &key).cloned())
        };

        if let Some(page) = page {
            if let Err(err) = self.store.save_ots_page(&tx.from, key.as_bytes(), page.as_bytes()) {
                metrics::counter!(Metrics::ENRICHMENT_ERRORS, "step" => "ots_page").increment(1);
                warn!(target: "mirror::ots", address = %tx.from, %err, "Failed to persist page");
            }
        }

        if status.is_reuse() {
            metrics::counter!(Metrics::OTS_REUSE).increment(1);
            error!(
                target: "mirror::ots",
                address = %tx.from,
                index = %index,
                tx_hash = %tx.hash,
                block_number = block.number,
                "One-time signature key index reused"
            );
            let event = OtsReuseEvent {
                address: tx.from,
                ots_index: format!("{index:#x}"),
                tx_hash: tx.hash,
                block_number: block.number,
                detected_at: unix_now(),
            };
            if let Err(err) = self.store.record_ots_reuse(event) {
                warn!(target: "mirror::ots", %err, "Failed to record reuse event");
            }
        }
        status
    }
}

/// Flattens nested call frames depth-first. The top-level frame is the transaction itself
/// and is not included.
fn flatten_calls(
    frames: &[CallFrame],
    path: &mut Vec<u32>,
    tx_hash: B256,
    block: &Block,
    out: &mut Vec<InternalCall>,
) {
    for (position, frame) in frames.iter().enumerate() {
        path.push(position as u32);
        out.push(InternalCall {
            tx_hash,
            block_number: block.number,
            call_type: frame.call_type.clone(),
            from: frame.from,
            to: frame.to,
            value: frame.value.unwrap_or_default(),
            gas: frame.gas.to::<u64>(),
            gas_used: frame.gas_used.to::<u64>(),
            input: frame.input.clone(),
            output: frame.output.clone().unwrap_or_default(),
            error: frame.error.clone(),
            trace_address: path.clone(),
            timestamp: block.timestamp,
        });
        flatten_calls(&frame.calls, path, tx_hash, block, out);
        path.pop();
    }
}

/// Decodes a `Transfer(address,address,uint256)` log.
fn token_transfer(log: &RpcLog, block: &Block) -> Option<TokenTransfer> {
    if log.topics.len() != 3 || log.topics[0] != TRANSFER_EVENT_TOPIC {
        return None;
    }
    let amount = log.data.get(..32).map(U256::from_be_slice)?;
    Some(TokenTransfer {
        contract: log.address,
        from: Address::from_word(log.topics[1]),
        to: Address::from_word(log.topics[2]),
        amount,
        tx_hash: log.transaction_hash?,
        block_number: block.number,
        log_index: log.log_index.to::<u64>(),
        timestamp: block.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockNode, call_frame, rpc_transaction};
    use alloy_primitives::{Bytes, U64};
    use zond_mirror_storage::{
        AccountStorage, ActivityStorage, BlockWriter, InMemoryStore, PendingStorage,
    };
    use zond_mirror_types::PendingTransaction;

    async fn stored_block(node: &MockNode, store: &InMemoryStore, number: u64) -> Block {
        let raw = node.block_by_number(number).await.unwrap().unwrap();
        let block = raw.into_block(Default::default()).unwrap();
        store.insert_blocks(&[block.clone()]).unwrap();
        block
    }

    fn enricher(node: MockNode) -> (Enricher<MockNode, InMemoryStore>, Arc<MockNode>, Arc<InMemoryStore>) {
        let node = Arc::new(node);
        let store = Arc::new(InMemoryStore::new());
        (Enricher::new(Arc::clone(&node), Arc::clone(&store)), node, store)
    }

    #[tokio::test]
    async fn test_ots_reuse_is_recorded() {
        let node = MockNode::with_chain(3);
        let sender = Address::new([9; 20]);
        let mut first = rpc_transaction(0x01, sender, Some(Address::new([8; 20])));
        first.signature = Bytes::from(vec![0, 0, 0, 7, 0xaa]);
        let mut second = rpc_transaction(0x02, sender, Some(Address::new([8; 20])));
        second.signature = Bytes::from(vec![0, 0, 0, 7, 0xbb]);
        node.add_transaction(2, first);
        node.add_transaction(3, second);
        let (enricher, node, store) = enricher(node);

        let block = stored_block(&node, &store, 2).await;
        assert_eq!(enricher.enrich_block(&block).await.ots_reuses, 0);
        assert!(enricher.ots_is_set(&sender, &BigUint::from(7u32)));

        let block = stored_block(&node, &store, 3).await;
        assert_eq!(enricher.enrich_block(&block).await.ots_reuses, 1);

        let events = store.ots_reuse_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ots_index, "0x7");
        assert_eq!(events[0].block_number, 3);
    }

    #[tokio::test]
    async fn test_ots_pages_survive_restart() {
        let node = MockNode::with_chain(3);
        let sender = Address::new([4; 20]);
        let mut first = rpc_transaction(0x01, sender, None);
        first.signature = Bytes::from(vec![0, 0, 4, 0]);
        let mut second = rpc_transaction(0x02, sender, None);
        second.signature = Bytes::from(vec![0, 0, 4, 0]);
        node.add_transaction(1, first);
        node.add_transaction(2, second);
        let (enricher, node, store) = enricher(node);

        let block = stored_block(&node, &store, 1).await;
        enricher.enrich_block(&block).await;

        let restarted = Enricher::new(Arc::clone(&node), Arc::clone(&store));
        let block = stored_block(&node, &store, 2).await;
        assert_eq!(restarted.enrich_block(&block).await.ots_reuses, 1);
    }

    #[tokio::test]
    async fn test_balances_keep_contract_flag() {
        let node = MockNode::with_chain(2);
        let target = Address::new([5; 20]);
        node.set_balance(target, U256::from(10));
        node.add_transaction(1, rpc_transaction(0x01, Address::new([6; 20]), Some(target)));
        let (enricher, node, store) = enricher(node);
        store
            .upsert_address(AddressRecord { id: target, balance: U256::ZERO, nonce: 3, is_contract: true })
            .unwrap();

        let block = stored_block(&node, &store, 1).await;
        let report = enricher.enrich_block(&block).await;
        assert_eq!(report.failed_steps, 0);

        let record = store.address(&target).unwrap().unwrap();
        assert_eq!(record.balance, U256::from(10));
        assert!(record.is_contract);
        assert_eq!(record.nonce, 3);
    }

    #[tokio::test]
    async fn test_internal_calls_skip_top_level_frame() {
        let node = MockNode::with_chain(2);
        let mut tx = rpc_transaction(0x01, Address::new([1; 20]), Some(Address::new([2; 20])));
        tx.input = Bytes::from_static(&[0xde, 0xad]);
        let hash = tx.hash;
        node.add_transaction(1, tx);
        let mut root = call_frame(Address::new([1; 20]), Address::new([2; 20]));
        let mut child = call_frame(Address::new([2; 20]), Address::new([3; 20]));
        child.calls.push(call_frame(Address::new([3; 20]), Address::new([4; 20])));
        root.calls.push(child);
        node.set_trace(hash, root);
        let (enricher, node, store) = enricher(node);

        let block = stored_block(&node, &store, 1).await;
        enricher.enrich_block(&block).await;

        let calls = store.internal_calls(hash).unwrap();
        let paths: Vec<_> = calls.iter().map(|call| call.trace_address.clone()).collect();
        assert_eq!(paths, vec![vec![0], vec![0, 0]]);
        assert_eq!(calls[1].to, Some(Address::new([4; 20])));
    }

    #[tokio::test]
    async fn test_pending_entry_marked_mined() {
        let node = MockNode::with_chain(2);
        let tx = rpc_transaction(0x01, Address::new([1; 20]), Some(Address::new([2; 20])));
        let hash = tx.hash;
        node.add_transaction(2, tx);
        let (enricher, node, store) = enricher(node);
        store
            .upsert_pending(PendingTransaction {
                hash,
                from: Address::new([1; 20]),
                to: Some(Address::new([2; 20])),
                nonce: 0,
                value: U256::ZERO,
                gas: 21_000,
                gas_price: None,
                input: Bytes::new(),
                status: PendingStatus::Pending,
                first_seen: 1,
                last_seen: 1,
                block_number: None,
            })
            .unwrap();

        let block = stored_block(&node, &store, 2).await;
        enricher.enrich_block(&block).await;

        let pending = store.pending(hash).unwrap().unwrap();
        assert_eq!(pending.status, PendingStatus::Mined);
        assert_eq!(pending.block_number, Some(2));
    }

    #[tokio::test]
    async fn test_token_detected_with_holder_balances() {
        let node = MockNode::with_chain(2);
        let token = Address::new([0x70; 20]);
        let alice = Address::new([0xa1; 20]);
        let bob = Address::new([0xb0; 20]);
        let tx = rpc_transaction(0x01, alice, Some(token));
        let hash = tx.hash;
        node.add_transaction(1, tx);
        node.deploy_token(token, "Quanta Test", "QT", 18, Some(U256::from(1_000)));
        node.set_token_balance(token, alice, U256::from(75));
        node.set_token_balance(token, bob, U256::from(25));
        node.add_transfer_log(1, token, Address::ZERO, alice, U256::from(100), hash);
        node.add_transfer_log(1, token, alice, bob, U256::from(25), hash);
        let (enricher, node, store) = enricher(node);

        let block = stored_block(&node, &store, 1).await;
        assert_eq!(enricher.enrich_block(&block).await.failed_steps, 0);

        let record = store.token_contract(&token).unwrap().unwrap();
        assert_eq!(record.symbol, "QT");
        assert_eq!(record.decimals, 18);
        assert_eq!(record.total_supply, Some(U256::from(1_000)));
        assert_eq!(record.first_seen_block, 1);
        assert_eq!(record.first_seen_tx, hash);
        assert_eq!(store.token_count().unwrap(), 1);

        let holders: Vec<_> = store
            .token_holders(&token)
            .unwrap()
            .into_iter()
            .map(|entry| (entry.holder, entry.balance))
            .collect();
        assert_eq!(holders, vec![(alice, U256::from(75)), (bob, U256::from(25))]);
        assert_eq!(store.token_transfers(1).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_token_balance_falls_back_to_transfer_amounts() {
        let node = MockNode::with_chain(2);
        let token = Address::new([0x70; 20]);
        let plain = Address::new([0x71; 20]);
        let alice = Address::new([0xa1; 20]);
        let bob = Address::new([0xb0; 20]);
        let tx = rpc_transaction(0x01, alice, Some(token));
        let hash = tx.hash;
        node.add_transaction(1, tx);
        node.deploy_token(token, "Quanta Test", "QT", 18, None);
        node.revert_balance_of(token);
        node.add_transfer_log(1, token, alice, bob, U256::from(4), hash);
        node.add_transfer_log(1, plain, alice, bob, U256::from(9), hash);
        let (enricher, node, store) = enricher(node);
        store
            .upsert_token_balance(TokenBalance {
                contract: token,
                holder: alice,
                balance: U256::from(10),
                block_number: 0,
                updated_at: 0,
            })
            .unwrap();

        let block = stored_block(&node, &store, 1).await;
        assert_eq!(enricher.enrich_block(&block).await.failed_steps, 0);

        let balance = |holder| store.token_balance(&token, &holder).unwrap().map(|entry| entry.balance);
        assert_eq!(balance(alice), Some(U256::from(6)));
        assert_eq!(balance(bob), Some(U256::from(4)));
        assert!(store.token_contract(&plain).unwrap().is_none());
        assert!(store.token_holders(&plain).unwrap().is_empty());
    }

    #[test]
    fn test_token_transfer_decoding() {
        let block = Block {
            number: 4,
            hash: B256::ZERO,
            parent_hash: B256::ZERO,
            timestamp: 100,
            size: 0,
            gas_used: 0,
            gas_limit: 0,
            base_fee_per_gas: None,
            miner: None,
            transactions: Vec::new(),
        };
        let from = Address::new([0x11; 20]);
        let to = Address::new([0x22; 20]);
        let log = RpcLog {
            address: Address::new([0x33; 20]),
            topics: vec![TRANSFER_EVENT_TOPIC, from.0.into_word(), to.0.into_word()],
            data: Bytes::from(U256::from(500).to_be_bytes::<32>().to_vec()),
            log_index: U64::from(2),
            transaction_hash: Some(B256::repeat_byte(0x44)),
            block_number: Some(U64::from(4)),
        };

        let transfer = token_transfer(&log, &block).unwrap();
        assert_eq!(transfer.from, from);
        assert_eq!(transfer.to, to);
        assert_eq!(transfer.amount, U256::from(500));
        assert_eq!(transfer.log_index, 2);

        let approval = RpcLog { topics: vec![B256::ZERO, B256::ZERO, B256::ZERO], ..log };
        assert!(token_transfer(&approval, &block).is_none());
    }
}
