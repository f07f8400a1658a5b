//! Diff Accumulator and the Consensus Change it turns into.

use serde::{Deserialize, Serialize};

use cairn_core::types::{
    BlockHeight, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId,
};

/// Whether a diff adds an output to the unspent set or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffDirection {
    Apply,
    Revert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinOutputDiff {
    pub direction: DiffDirection,
    pub id: CoinOutputId,
    pub output: CoinOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStakeOutputDiff {
    pub direction: DiffDirection,
    pub id: BlockStakeOutputId,
    pub output: BlockStakeOutput,
}

/// Diffs staged while one batch is applied. Owned by a single call.
#[derive(Debug, Default)]
pub struct DiffHolder {
    pub height: BlockHeight,
    coin_output_diffs: Vec<CoinOutputDiff>,
    block_stake_output_diffs: Vec<BlockStakeOutputDiff>,
}

impl DiffHolder {
    pub fn new(height: BlockHeight) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    pub fn push_coin(&mut self, direction: DiffDirection, id: CoinOutputId, output: CoinOutput) {
        self.coin_output_diffs.push(CoinOutputDiff { direction, id, output });
    }

    pub fn push_block_stake(
        &mut self,
        direction: DiffDirection,
        id: BlockStakeOutputId,
        output: BlockStakeOutput,
    ) {
        self.block_stake_output_diffs
            .push(BlockStakeOutputDiff { direction, id, output });
    }

    pub fn into_change(self) -> ConsensusChange {
        ConsensusChange {
            coin_output_diffs: self.coin_output_diffs,
            block_stake_output_diffs: self.block_stake_output_diffs,
        }
    }
}

/// Ordered diffs produced by an applied or tried batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusChange {
    pub coin_output_diffs: Vec<CoinOutputDiff>,
    pub block_stake_output_diffs: Vec<BlockStakeOutputDiff>,
}

impl ConsensusChange {
    pub fn is_empty(&self) -> bool {
        self.coin_output_diffs.is_empty() && self.block_stake_output_diffs.is_empty()
    }
}
