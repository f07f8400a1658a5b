//! Criterion benchmarks for the consensus set.
//!
//! Covers: speculative try of a single spend, and unspent output lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use cairn_consensus::ConsensusSet;
use cairn_core::constants::ChainConstants;
use cairn_core::types::{CoinInput, CoinOutput, Transaction, UnlockCondition, UnlockFulfillment};

fn open_set() -> (ConsensusSet, TempDir) {
    let dir = TempDir::new().unwrap();
    let set = ConsensusSet::open(dir.path().join("consensus.db"), ChainConstants::devnet()).unwrap();
    (set, dir)
}

fn genesis_spend(constants: &ChainConstants) -> Transaction {
    let genesis = &constants.genesis_block().transactions[0];
    let fee = constants.validation.minimum_miner_fee;
    Transaction {
        coin_inputs: vec![CoinInput {
            parent_id: genesis.coin_output_id(0),
            fulfillment: UnlockFulfillment::Nil,
        }],
        coin_outputs: vec![CoinOutput {
            value: constants.genesis_coin_outputs[0].value - fee,
            condition: UnlockCondition::Nil,
        }],
        miner_fees: vec![fee],
        ..Transaction::default()
    }
}

fn bench_try_transaction_set(c: &mut Criterion) {
    let (set, _dir) = open_set();
    let txns = vec![genesis_spend(set.constants())];
    c.bench_function("try_transaction_set/single_spend", |b| {
        b.iter(|| set.try_transaction_set(black_box(&txns)).unwrap())
    });
}

fn bench_unspent_lookup(c: &mut Criterion) {
    let (set, _dir) = open_set();
    let id = set.constants().genesis_block().transactions[0].coin_output_id(0);
    c.bench_function("unspent_coin_output/genesis", |b| {
        b.iter(|| set.unspent_coin_output(black_box(&id)).unwrap())
    });
}

criterion_group!(benches, bench_try_transaction_set, bench_unspent_lookup);
criterion_main!(benches);
