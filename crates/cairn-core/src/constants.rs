//! Chain constants. All monetary values in base units (1 coin = 10^9 units).

use serde::{Deserialize, Serialize};

use crate::types::{
    Block, BlockId, BlockStakeOutput, CoinOutput, Currency, Hash256, Target, Timestamp,
    Transaction, TransactionVersion, UnlockCondition,
};

pub const ONE_COIN: Currency = 1_000_000_000;

/// Limits every transaction is validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionValidationConstants {
    /// Maximum encoded size of a block, and therefore of one transaction.
    pub block_size_limit: u64,
    pub arbitrary_data_size_limit: u64,
    pub minimum_miner_fee: Currency,
}

impl Default for TransactionValidationConstants {
    fn default() -> Self {
        Self {
            block_size_limit: 2_000_000,
            arbitrary_data_size_limit: 83,
            minimum_miner_fee: ONE_COIN / 10,
        }
    }
}

/// Parameters of one chain, supplied by the embedding node.
///
/// [`ChainConstants::default`] is a devnet: a single genesis allocation of
/// coins and block stakes, both spendable by anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConstants {
    pub validation: TransactionValidationConstants,
    pub genesis_timestamp: Timestamp,
    pub genesis_coin_outputs: Vec<CoinOutput>,
    pub genesis_block_stake_outputs: Vec<BlockStakeOutput>,
    pub root_target: Target,
    pub default_transaction_version: TransactionVersion,
}

impl Default for ChainConstants {
    fn default() -> Self {
        Self::devnet()
    }
}

impl ChainConstants {
    pub fn devnet() -> Self {
        Self {
            validation: TransactionValidationConstants::default(),
            // 2017-08-01T00:00:00Z
            genesis_timestamp: 1_501_545_600,
            genesis_coin_outputs: vec![CoinOutput {
                value: 100_000_000 * ONE_COIN,
                condition: UnlockCondition::Nil,
            }],
            genesis_block_stake_outputs: vec![BlockStakeOutput {
                value: 3_000,
                condition: UnlockCondition::Nil,
            }],
            root_target: Target(Hash256([0x40; 32])),
            default_transaction_version: TransactionVersion::ONE,
        }
    }

    /// The genesis block: a single transaction creating the genesis outputs.
    pub fn genesis_block(&self) -> Block {
        Block {
            parent_id: BlockId::default(),
            timestamp: self.genesis_timestamp,
            transactions: vec![self.genesis_transaction()],
        }
    }

    fn genesis_transaction(&self) -> Transaction {
        Transaction {
            version: self.default_transaction_version,
            coin_outputs: self.genesis_coin_outputs.clone(),
            block_stake_outputs: self.genesis_block_stake_outputs.clone(),
            ..Transaction::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_is_stable() {
        let c = ChainConstants::devnet();
        assert_eq!(c.genesis_block().id(), c.genesis_block().id());
        assert_eq!(c.genesis_block().transactions.len(), 1);
    }

    #[test]
    fn genesis_depends_on_allocation() {
        let a = ChainConstants::devnet();
        let mut b = a.clone();
        b.genesis_coin_outputs[0].value += 1;
        assert_ne!(a.genesis_block().id(), b.genesis_block().id());
    }

    #[test]
    fn genesis_is_not_block_creating() {
        assert_eq!(ChainConstants::devnet().genesis_block().block_creating_index(), None);
    }

    #[test]
    fn default_minimum_fee_is_a_tenth_coin() {
        assert_eq!(TransactionValidationConstants::default().minimum_miner_fee, ONE_COIN / 10);
    }
}
