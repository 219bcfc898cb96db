//! Validator and chain statistics snapshots.

use super::PeriodicTask;
use crate::TaskError;
use alloy_primitives::U256;
use async_trait::async_trait;
use std::sync::Arc;
use zond_mirror_rpc::{MarketClient, NodeClient, RpcError};
use zond_mirror_storage::MirrorStore;
use zond_mirror_types::{BlockRef, ChainStats, unix_now};

/// Length of the volume window in seconds.
const DAY_SECS: u64 = 86_400;

/// Replaces the stored validator snapshot with the beacon node's current set.
#[derive(Debug)]
pub struct ValidatorRefresher<C, S> {
    client: Arc<C>,
    store: Arc<S>,
}

impl<C, S> ValidatorRefresher<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    /// Creates a new [`ValidatorRefresher`].
    pub const fn new(client: Arc<C>, store: Arc<S>) -> Self {
        Self { client, store }
    }

    /// Fetches and stores a validator snapshot. Returns `false` when no beacon endpoint is
    /// configured.
    pub async fn refresh(&self) -> Result<bool, TaskError> {
        let snapshot = match self.client.validators().await {
            Ok(snapshot) => snapshot,
            Err(RpcError::NotConfigured(endpoint)) => {
                debug!(target: "mirror::snapshots", endpoint, "Skipping validator refresh");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            target: "mirror::snapshots",
            epoch = snapshot.epoch,
            validators = snapshot.validators.len(),
            "Refreshed validator snapshot"
        );
        self.store.save_validators(snapshot)?;
        Ok(true)
    }
}

#[async_trait]
impl<C, S> PeriodicTask for ValidatorRefresher<C, S>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    fn name(&self) -> &'static str {
        "validator_refresh"
    }

    async fn run(&self) -> Result<(), TaskError> {
        self.refresh().await?;
        Ok(())
    }
}

/// Recomputes chain statistics and refreshes market data.
#[derive(Debug)]
pub struct StatsRefresher<S> {
    store: Arc<S>,
    market: Option<MarketClient>,
}

impl<S> StatsRefresher<S>
where
    S: MirrorStore + 'static,
{
    /// Creates a new [`StatsRefresher`].
    pub const fn new(store: Arc<S>, market: Option<MarketClient>) -> Self {
        Self { store, market }
    }

    /// Computes and stores fresh statistics.
    ///
    /// A failed market request keeps the previously stored market data.
    pub async fn refresh(&self) -> Result<ChainStats, TaskError> {
        let previous = self.store.chain_stats()?;
        let market = match &self.market {
            Some(client) => match client.market_data().await {
                Ok(data) => Some(data),
                Err(err) => {
                    warn!(target: "mirror::snapshots", %err, "Market data request failed, keeping previous values");
                    previous.and_then(|stats| stats.market)
                }
            },
            None => None,
        };

        let latest = self.store.latest_block()?;
        let daily_volume = match &latest {
            Some(head) => self.daily_volume(head)?,
            None => U256::ZERO,
        };
        let stats = ChainStats {
            latest_block: latest.map_or(0, |block| block.number),
            total_blocks: self.store.block_count()?,
            total_transactions: self.store.transaction_count()?,
            total_addresses: self.store.address_count()?,
            total_contracts: self.store.contract_count()?,
            funded_addresses: self.store.funded_address_count()?,
            total_tokens: self.store.token_count()?,
            daily_volume,
            circulating_supply: self.store.circulating_supply()?,
            market,
            updated_at: unix_now(),
        };
        self.store.save_chain_stats(stats.clone())?;
        debug!(target: "mirror::snapshots", blocks = stats.total_blocks, "Refreshed chain statistics");
        Ok(stats)
    }

    /// Sums the native value of transactions in stored blocks at most a day older than
    /// `head`.
    fn daily_volume(&self, head: &BlockRef) -> Result<U256, TaskError> {
        let since = head.timestamp.saturating_sub(DAY_SECS);
        let numbers =
            self.store.block_numbers_in_range(head.number.saturating_sub(DAY_SECS), head.number)?;
        let mut volume = U256::ZERO;
        for number in numbers.into_iter().rev() {
            let Some(block) = self.store.block(number)? else {
                continue;
            };
            if block.timestamp < since {
                break;
            }
            volume = block.transactions.iter().fold(volume, |sum, tx| sum.saturating_add(tx.value));
        }
        Ok(volume)
    }
}

#[async_trait]
impl<S> PeriodicTask for StatsRefresher<S>
where
    S: MirrorStore + 'static,
{
    fn name(&self) -> &'static str {
        "stats_refresh"
    }

    async fn run(&self) -> Result<(), TaskError> {
        self.refresh().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockNode, persist_chain, rpc_transaction};
    use std::collections::HashMap;
    use zond_mirror_storage::{
        AccountStorage, ActivityStorage, BlockWriter, InMemoryStore, SnapshotStorage,
    };
    use zond_mirror_types::{Address, AddressRecord, TokenContract, Validator, ValidatorSnapshot};

    #[tokio::test]
    async fn test_validator_refresh_replaces_snapshot() {
        let node = Arc::new(MockNode::with_chain(1));
        let validator = Validator {
            index: 4,
            public_key: "key".to_string(),
            effective_balance: 40_000,
            slashed: false,
            activation_epoch: 0,
            exit_epoch: u64::MAX,
        };
        node.set_validators(ValidatorSnapshot {
            epoch: 9,
            total_size: 1,
            validators: vec![validator],
            updated_at: 0,
        });
        let store = Arc::new(InMemoryStore::new());
        let refresher = ValidatorRefresher::new(node, Arc::clone(&store));

        assert!(refresher.refresh().await.unwrap());
        assert_eq!(store.validators().unwrap().map(|snapshot| snapshot.epoch), Some(9));
    }

    #[tokio::test]
    async fn test_validator_refresh_without_beacon_is_skipped() {
        let node = Arc::new(MockNode::with_chain(1));
        node.disable_beacon();
        let store = Arc::new(InMemoryStore::new());
        let refresher = ValidatorRefresher::new(node, Arc::clone(&store));

        assert!(!refresher.refresh().await.unwrap());
        assert!(store.validators().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_count_stored_blocks() {
        let node = MockNode::with_chain(5);
        let store = Arc::new(InMemoryStore::new());
        persist_chain(&node, &store, 0..=5).await;

        let stats = StatsRefresher::new(Arc::clone(&store), None).refresh().await.unwrap();
        assert_eq!(stats.latest_block, 5);
        assert_eq!(stats.total_blocks, 6);
        assert!(stats.market.is_none());
        assert_eq!(store.chain_stats().unwrap(), Some(stats));
    }

    #[tokio::test]
    async fn test_stats_volume_and_supply() {
        let node = MockNode::with_chain(3);
        let sender = Address::new([1; 20]);
        for (number, tag, value) in [(1, 0x01, 100), (2, 0x02, 7), (3, 0x03, 5)] {
            let mut tx = rpc_transaction(tag, sender, Some(Address::new([2; 20])));
            tx.value = U256::from(value);
            node.add_transaction(number, tx);
        }
        let store = Arc::new(InMemoryStore::new());
        let blocks: Vec<_> = (0..=3)
            .filter_map(|number| node.raw_block(number))
            .map(|raw| raw.into_block(HashMap::new()).unwrap())
            .map(|mut block| {
                if block.number <= 1 {
                    block.timestamp -= 2 * DAY_SECS;
                }
                block
            })
            .collect();
        store.insert_blocks(&blocks).unwrap();
        for (tag, balance) in [(0x10, 40), (0x11, 0), (0x12, 2)] {
            store
                .upsert_address(AddressRecord {
                    id: Address::new([tag; 20]),
                    balance: U256::from(balance),
                    nonce: 0,
                    is_contract: false,
                })
                .unwrap();
        }
        store
            .upsert_token_contract(TokenContract {
                address: Address::new([0x70; 20]),
                name: "Quanta Test".to_string(),
                symbol: "QT".to_string(),
                decimals: 18,
                total_supply: None,
                first_seen_block: 2,
                first_seen_tx: Default::default(),
                updated_at: 0,
            })
            .unwrap();

        let stats = StatsRefresher::new(Arc::clone(&store), None).refresh().await.unwrap();
        assert_eq!(stats.daily_volume, U256::from(12));
        assert_eq!(stats.circulating_supply, U256::from(42));
        assert_eq!(stats.funded_addresses, 2);
        assert_eq!(stats.total_tokens, 1);
    }
}
