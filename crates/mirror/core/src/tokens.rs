//! ERC-20 token detection and holder balances.

use alloy_primitives::U256;
use zond_mirror_rpc::{
    DECIMALS_SELECTOR, NAME_SELECTOR, NodeClient, SYMBOL_SELECTOR, TOTAL_SUPPLY_SELECTOR,
    balance_of_call, decode_decimals, decode_string, decode_uint, selector_call,
};
use zond_mirror_types::{Address, TokenContract, TokenTransfer, unix_now};

/// Metadata of a contract that answers like an ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// `name()`.
    pub name: String,
    /// `symbol()`.
    pub symbol: String,
    /// `decimals()`.
    pub decimals: u8,
    /// `totalSupply()`, if the contract answers it.
    pub total_supply: Option<U256>,
}

impl TokenMetadata {
    /// Reads the metadata of `contract`.
    ///
    /// Returns `None` unless `name`, `symbol` and `decimals` all answer with decodable values.
    pub async fn fetch<C: NodeClient>(client: &C, contract: Address) -> Option<Self> {
        let (name, symbol, decimals, total_supply) = tokio::join!(
            client.call(contract, selector_call(NAME_SELECTOR)),
            client.call(contract, selector_call(SYMBOL_SELECTOR)),
            client.call(contract, selector_call(DECIMALS_SELECTOR)),
            client.call(contract, selector_call(TOTAL_SUPPLY_SELECTOR)),
        );
        Some(Self {
            name: decode_string(&name.ok()?)?,
            symbol: decode_string(&symbol.ok()?)?,
            decimals: decode_decimals(&decimals.ok()?)?,
            total_supply: total_supply.ok().and_then(|data| decode_uint(&data)),
        })
    }

    /// The stored record for a token first seen in `transfer`.
    pub fn into_record(self, transfer: &TokenTransfer) -> TokenContract {
        TokenContract {
            address: transfer.contract,
            name: self.name,
            symbol: self.symbol,
            decimals: self.decimals,
            total_supply: self.total_supply,
            first_seen_block: transfer.block_number,
            first_seen_tx: transfer.tx_hash,
            updated_at: unix_now(),
        }
    }
}

/// Reads the `balanceOf` answer of `contract` for `holder`.
pub async fn balance_of<C: NodeClient>(client: &C, contract: Address, holder: Address) -> Option<U256> {
    let data = client.call(contract, balance_of_call(holder)).await.ok()?;
    decode_uint(&data)
}

/// Applies the transfers of `contract` touching `holder` to `previous`.
///
/// Used when the contract cannot be asked directly. Outgoing amounts saturate at zero.
pub fn apply_transfers(
    previous: U256,
    transfers: &[TokenTransfer],
    contract: Address,
    holder: Address,
) -> U256 {
    transfers.iter().filter(|transfer| transfer.contract == contract).fold(
        previous,
        |balance, transfer| {
            let balance = if transfer.to == holder {
                balance.saturating_add(transfer.amount)
            } else {
                balance
            };
            if transfer.from == holder { balance.saturating_sub(transfer.amount) } else { balance }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockNode;
    use alloy_primitives::B256;

    fn transfer(from: Address, to: Address, amount: u64) -> TokenTransfer {
        TokenTransfer {
            contract: Address::new([0x70; 20]),
            from,
            to,
            amount: U256::from(amount),
            tx_hash: B256::repeat_byte(0x01),
            block_number: 4,
            log_index: 0,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_fetch_reads_token_metadata() {
        let node = MockNode::with_chain(1);
        let contract = Address::new([0x70; 20]);
        node.deploy_token(contract, "Quanta Test", "QT", 18, None);

        let metadata = TokenMetadata::fetch(&node, contract).await.unwrap();
        assert_eq!(metadata.name, "Quanta Test");
        assert_eq!(metadata.symbol, "QT");
        assert_eq!(metadata.decimals, 18);
        assert_eq!(metadata.total_supply, None);
    }

    #[tokio::test]
    async fn test_fetch_rejects_plain_contract() {
        let node = MockNode::with_chain(1);
        assert!(TokenMetadata::fetch(&node, Address::new([0x71; 20])).await.is_none());
    }

    #[test]
    fn test_apply_transfers_saturates() {
        let alice = Address::new([0xa1; 20]);
        let bob = Address::new([0xb0; 20]);
        let transfers = vec![transfer(alice, bob, 30), transfer(bob, alice, 5)];

        let contract = transfers[0].contract;
        assert_eq!(apply_transfers(U256::from(10), &transfers, contract, bob), U256::from(35));
        assert_eq!(apply_transfers(U256::from(10), &transfers, contract, alice), U256::from(5));
        assert_eq!(apply_transfers(U256::from(3), &transfers[..1], contract, alice), U256::ZERO);
    }
}
