//! Shared test helpers for E2E and property tests.

use std::path::PathBuf;

use tempfile::TempDir;

use cairn_consensus::{ConsensusSet, ConsensusSetBuilder};
use cairn_core::constants::{ChainConstants, TransactionValidationConstants};
use cairn_core::crypto::{self, KeyPair};
use cairn_core::types::*;

/// A consensus set in a temporary directory. The directory lives as long as
/// the struct.
pub struct TestChain {
    pub set: ConsensusSet,
    pub dir: TempDir,
}

impl TestChain {
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("consensus.db")
    }
}

/// One spendable coin output of 100, 50 block stakes, minimum fee 1.
pub fn small_constants() -> ChainConstants {
    ChainConstants {
        validation: TransactionValidationConstants {
            minimum_miner_fee: 1,
            ..TransactionValidationConstants::default()
        },
        genesis_coin_outputs: vec![CoinOutput { value: 100, condition: UnlockCondition::Nil }],
        genesis_block_stake_outputs: vec![BlockStakeOutput {
            value: 50,
            condition: UnlockCondition::Nil,
        }],
        ..ChainConstants::devnet()
    }
}

pub fn open_chain(constants: ChainConstants) -> TestChain {
    open_with(ConsensusSetBuilder::standard(constants))
}

pub fn open_with(builder: ConsensusSetBuilder) -> TestChain {
    let dir = tempfile::tempdir().unwrap();
    let set = builder.open(dir.path().join("consensus.db")).unwrap();
    TestChain { set, dir }
}

/// Output id of the genesis coin output at `index`.
pub fn genesis_coin(constants: &ChainConstants, index: usize) -> CoinOutputId {
    constants.genesis_block().transactions[0].coin_output_id(index)
}

/// Output id of the genesis block stake output at `index`.
pub fn genesis_stake(constants: &ChainConstants, index: usize) -> BlockStakeOutputId {
    constants.genesis_block().transactions[0].block_stake_output_id(index)
}

/// Unsigned spend of `inputs` into anyone-can-spend outputs.
pub fn spend(inputs: &[CoinOutputId], outputs: &[Currency], fees: &[Currency]) -> Transaction {
    Transaction {
        coin_inputs: inputs
            .iter()
            .map(|&parent_id| CoinInput { parent_id, fulfillment: UnlockFulfillment::Nil })
            .collect(),
        coin_outputs: outputs
            .iter()
            .map(|&value| CoinOutput { value, condition: UnlockCondition::Nil })
            .collect(),
        miner_fees: fees.to_vec(),
        ..Transaction::default()
    }
}

/// Spend `input` into one output locked to `owner`.
pub fn lock_to(input: CoinOutputId, value: Currency, fee: Currency, owner: &KeyPair) -> Transaction {
    let mut tx = spend(&[input], &[value], &[fee]);
    tx.coin_outputs[0].condition = owner.unlock_condition();
    tx
}

/// Sign every coin input of `tx` with `key`.
pub fn sign_all(mut tx: Transaction, key: &KeyPair) -> Transaction {
    for i in 0..tx.coin_inputs.len() {
        crypto::sign_input(&mut tx, InputKind::Coin, i, key).unwrap();
    }
    tx
}

/// A pure block stake respend: block-creating when first in a block.
pub fn stake_respend(input: BlockStakeOutputId, value: Currency) -> Transaction {
    Transaction {
        block_stake_inputs: vec![BlockStakeInput {
            parent_id: input,
            fulfillment: UnlockFulfillment::Nil,
        }],
        block_stake_outputs: vec![BlockStakeOutput { value, condition: UnlockCondition::Nil }],
        ..Transaction::default()
    }
}

/// A block on top of the current tip, 120 seconds later.
pub fn next_block(set: &ConsensusSet, transactions: Vec<Transaction>) -> Block {
    let tip = set.current_block().unwrap();
    Block {
        parent_id: tip.block.id(),
        timestamp: tip.block.timestamp + 120,
        transactions,
    }
}

/// Context for applying `txns` as the next block without a block-creating tx.
pub fn next_context(set: &ConsensusSet) -> BlockContext {
    let tip = set.current_block().unwrap();
    BlockContext::pool(tip.height + 1, tip.block.timestamp + 120)
}
