//! Adversarial property-based tests for the consensus set.
//!
//! Every case opens a real store, so case counts are kept modest.
//!
//! Attack vectors tested:
//! - Value creation through unbalanced outputs and fees
//! - Overflowing output values
//! - Invalid transactions hidden deep inside otherwise valid batches
//! - Speculative tries that disagree with real application

use proptest::prelude::*;

use cairn_consensus::ConsensusChange;
use cairn_core::types::*;
use cairn_tests::helpers::*;

fn config() -> ProptestConfig {
    ProptestConfig::with_cases(24)
}

/// A chain of spends starting at the genesis output, each paying `fee`.
fn spend_chain(start: CoinOutputId, start_value: Currency, fees: &[Currency]) -> Vec<Transaction> {
    let mut txns = Vec::with_capacity(fees.len());
    let mut input = start;
    let mut value = start_value;
    for &fee in fees {
        value -= fee;
        let tx = spend(&[input], &[value], &[fee]);
        input = tx.coin_output_id(0);
        txns.push(tx);
    }
    txns
}

fn coin_ids(change: &ConsensusChange) -> Vec<CoinOutputId> {
    change.coin_output_diffs.iter().map(|d| d.id).collect()
}

proptest! {
    #![proptest_config(config())]

    /// A single spend of the 100-unit genesis output succeeds exactly when it
    /// balances, pays at least the minimum fee and creates no empty outputs.
    #[test]
    fn single_spend_accepted_iff_valid(
        outputs in prop::collection::vec(0u64..=100, 1..4),
        fee in 0u64..=5,
    ) {
        let chain = open_chain(small_constants());
        let o = genesis_coin(chain.set.constants(), 0);
        let tx = spend(&[o], &outputs, &[fee]);

        let valid = outputs.iter().sum::<u64>() + fee == 100
            && fee >= 1
            && outputs.iter().all(|&v| v > 0);

        let before = chain.set.state_digest().unwrap();
        let tried = chain.set.try_transaction_set(std::slice::from_ref(&tx));
        prop_assert_eq!(chain.set.state_digest().unwrap(), before);
        prop_assert_eq!(tried.is_ok(), valid);

        let tip = chain.set.current_block().unwrap();
        let context = BlockContext::pool(tip.height, tip.block.timestamp);
        let applied = chain.set.apply_transactions(std::slice::from_ref(&tx), &context);
        prop_assert_eq!(applied.is_ok(), valid);

        match (tried, applied) {
            (Ok(tried), Ok(applied)) => {
                prop_assert_eq!(tried, applied);
                prop_assert!(chain.set.unspent_coin_output(&o).unwrap_err().is_not_found());
            }
            _ => {
                prop_assert_eq!(chain.set.state_digest().unwrap(), before);
                prop_assert_eq!(chain.set.unspent_coin_output(&o).unwrap().value, 100);
            }
        }
    }

    /// Outputs summing past u64::MAX never create value.
    #[test]
    fn overflowing_outputs_rejected(extra in 1u64..=1_000) {
        let chain = open_chain(small_constants());
        let o = genesis_coin(chain.set.constants(), 0);
        let tx = spend(&[o], &[u64::MAX, extra], &[1]);

        let before = chain.set.state_digest().unwrap();
        let context = next_context(&chain.set);
        prop_assert!(chain.set.apply_transactions(&[tx], &context).is_err());
        prop_assert_eq!(chain.set.state_digest().unwrap(), before);
    }

    /// One bad transaction anywhere in a batch rolls back the whole batch.
    #[test]
    fn bad_transaction_anywhere_rolls_back_batch(
        fees in prop::collection::vec(1u64..=5, 2..8),
        bad_index in any::<prop::sample::Index>(),
    ) {
        let chain = open_chain(small_constants());
        let o = genesis_coin(chain.set.constants(), 0);
        let mut txns = spend_chain(o, 100, &fees);

        // Inflate one output by one unit; every later spend is then unbalanced too.
        let i = bad_index.index(txns.len());
        txns[i].coin_outputs[0].value += 1;

        let before = chain.set.state_digest().unwrap();
        prop_assert!(chain.set.try_transaction_set(&txns).is_err());
        let context = next_context(&chain.set);
        prop_assert!(chain.set.apply_transactions(&txns, &context).is_err());
        prop_assert_eq!(chain.set.state_digest().unwrap(), before);
    }

    /// A valid chain of spends is applied in order and try predicts it exactly.
    #[test]
    fn valid_spend_chain_matches_try(fees in prop::collection::vec(1u64..=5, 1..8)) {
        let chain = open_chain(small_constants());
        let o = genesis_coin(chain.set.constants(), 0);
        let txns = spend_chain(o, 100, &fees);

        let tried = chain.set.try_transaction_set(&txns).unwrap();
        let block = next_block(&chain.set, txns.clone());
        let accepted = chain.set.accept_block(&block).unwrap();
        prop_assert_eq!(coin_ids(&tried), coin_ids(&accepted));
        prop_assert_eq!(accepted.coin_output_diffs.len(), 2 * fees.len());

        let last = txns.last().unwrap().coin_output_id(0);
        let remaining = 100 - fees.iter().sum::<u64>();
        prop_assert_eq!(chain.set.unspent_coin_output(&last).unwrap().value, remaining);
    }
}
