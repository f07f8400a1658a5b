//! Applies one validated transaction to the unspent output buckets.

use tracing::debug;

use cairn_core::error::ConsensusError;
use cairn_core::types::Transaction;

use crate::chain_db::{self, must_exist};
use crate::diff::{DiffDirection, DiffHolder};
use crate::store::StoreTxn;

/// Remove the outputs `tx` spends and insert the ones it creates.
///
/// Removals are recorded before additions. Runs only after validation, so a
/// missing input here is a broken invariant, not a user error.
pub fn apply_transaction(
    txn: &StoreTxn<'_>,
    diffs: &mut DiffHolder,
    tx: &Transaction,
) -> Result<(), ConsensusError> {
    for input in &tx.coin_inputs {
        let output = must_exist(chain_db::get_coin_output(txn, &input.parent_id))?;
        chain_db::remove_coin_output(txn, &input.parent_id)?;
        diffs.push_coin(DiffDirection::Revert, input.parent_id, output);
    }
    for (i, output) in tx.coin_outputs.iter().enumerate() {
        let id = tx.coin_output_id(i);
        chain_db::add_coin_output(txn, &id, output)?;
        diffs.push_coin(DiffDirection::Apply, id, output.clone());
    }

    for input in &tx.block_stake_inputs {
        let output = must_exist(chain_db::get_block_stake_output(txn, &input.parent_id))?;
        chain_db::remove_block_stake_output(txn, &input.parent_id)?;
        diffs.push_block_stake(DiffDirection::Revert, input.parent_id, output);
    }
    for (i, output) in tx.block_stake_outputs.iter().enumerate() {
        let id = tx.block_stake_output_id(i);
        chain_db::add_block_stake_output(txn, &id, output)?;
        diffs.push_block_stake(DiffDirection::Apply, id, output.clone());
    }

    debug!(txid = %tx.id(), height = diffs.height, "staged transaction diffs");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use cairn_core::constants::ChainConstants;
    use cairn_core::types::{CoinInput, CoinOutput, UnlockCondition, UnlockFulfillment};

    #[test]
    fn spend_genesis_output() {
        let dir = tempfile::tempdir().unwrap();
        let c = ChainConstants::devnet();
        let genesis_tx = c.genesis_block().transactions[0].clone();
        let init = move |txn: &StoreTxn<'_>| chain_db::init_genesis(txn, &c);
        let store = Store::open_or_create(dir.path().join("consensus.db"), &init).unwrap();

        let source = genesis_tx.coin_output_id(0);
        let tx = Transaction {
            coin_inputs: vec![CoinInput { parent_id: source, fulfillment: UnlockFulfillment::Nil }],
            coin_outputs: vec![CoinOutput { value: 10, condition: UnlockCondition::Nil }],
            ..Transaction::default()
        };

        let change = store
            .update(|txn| {
                let mut diffs = DiffHolder::new(1);
                apply_transaction(txn, &mut diffs, &tx)?;
                Ok(diffs.into_change())
            })
            .unwrap();

        assert_eq!(change.coin_output_diffs.len(), 2);
        assert_eq!(change.coin_output_diffs[0].direction, DiffDirection::Revert);
        assert_eq!(change.coin_output_diffs[0].id, source);
        assert_eq!(change.coin_output_diffs[1].id, tx.coin_output_id(0));

        assert!(store.view(|txn| chain_db::get_coin_output(txn, &source)).is_err());
        assert!(store.view(|txn| chain_db::get_coin_output(txn, &tx.coin_output_id(0))).is_ok());
    }

    #[test]
    fn missing_input_is_violation() {
        let dir = tempfile::tempdir().unwrap();
        let c = ChainConstants::devnet();
        let init = move |txn: &StoreTxn<'_>| chain_db::init_genesis(txn, &c);
        let store = Store::open_or_create(dir.path().join("consensus.db"), &init).unwrap();

        let tx = Transaction {
            coin_inputs: vec![CoinInput {
                parent_id: Default::default(),
                fulfillment: UnlockFulfillment::Nil,
            }],
            ..Transaction::default()
        };
        let err = store
            .speculate(|txn| apply_transaction(txn, &mut DiffHolder::new(1), &tx))
            .unwrap_err();
        assert!(err.is_consistency_violation());
    }
}
