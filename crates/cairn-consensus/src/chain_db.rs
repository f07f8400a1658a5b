//! Typed accessors over the chain buckets.
//!
//! Lookups of absent keys return [`StateError`]. Writes that would break an
//! invariant (inserting an existing key, removing a missing output) return
//! [`ConsensusError::ConsistencyViolation`].

use cairn_core::constants::ChainConstants;
use cairn_core::error::{ConsensusError, StateError};
use cairn_core::types::{
    BlockHeight, BlockId, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId,
    ConsensusBlock,
};

use crate::store::{
    StoreTxn, BUCKET_BLOCK_MAP, BUCKET_BLOCK_PATH, BUCKET_BLOCK_STAKE_OUTPUTS,
    BUCKET_COIN_OUTPUTS, BUCKET_METADATA,
};

const KEY_HEIGHT: &[u8] = b"height";

fn height_key(height: BlockHeight) -> [u8; 8] {
    height.to_be_bytes()
}

fn repeat_insert(what: &str, key: impl std::fmt::Display) -> ConsensusError {
    ConsensusError::ConsistencyViolation(format!("repeat insert of {what} {key}"))
}

/// Turn a lookup failure on data that must exist into a consistency violation.
pub(crate) fn must_exist<T>(result: Result<T, ConsensusError>) -> Result<T, ConsensusError> {
    result.map_err(|e| match e {
        ConsensusError::State(e) => ConsensusError::ConsistencyViolation(e.to_string()),
        other => other,
    })
}

// --- Height ---

pub fn block_height(txn: &StoreTxn<'_>) -> Result<BlockHeight, ConsensusError> {
    txn.get_decoded(BUCKET_METADATA, KEY_HEIGHT)?
        .ok_or_else(|| ConsensusError::ConsistencyViolation("block height missing".into()))
}

pub fn set_block_height(txn: &StoreTxn<'_>, height: BlockHeight) -> Result<(), ConsensusError> {
    txn.put_encoded(BUCKET_METADATA, KEY_HEIGHT, &height)
}

// --- Blocks ---

pub fn has_block(txn: &StoreTxn<'_>, id: &BlockId) -> Result<bool, ConsensusError> {
    Ok(txn.get(BUCKET_BLOCK_MAP, id.as_bytes())?.is_some())
}

pub fn get_block_map(txn: &StoreTxn<'_>, id: &BlockId) -> Result<ConsensusBlock, ConsensusError> {
    txn.get_decoded(BUCKET_BLOCK_MAP, id.as_bytes())?
        .ok_or_else(|| StateError::BlockNotFound(id.to_string()).into())
}

pub fn add_block_map(txn: &StoreTxn<'_>, block: &ConsensusBlock) -> Result<(), ConsensusError> {
    let id = block.block.id();
    if has_block(txn, &id)? {
        return Err(repeat_insert("block", id));
    }
    txn.put_encoded(BUCKET_BLOCK_MAP, id.as_bytes(), block)
}

pub fn get_path(txn: &StoreTxn<'_>, height: BlockHeight) -> Result<BlockId, ConsensusError> {
    txn.get_decoded(BUCKET_BLOCK_PATH, &height_key(height))?
        .ok_or_else(|| StateError::PathNotFound(height).into())
}

pub fn push_path(txn: &StoreTxn<'_>, height: BlockHeight, id: &BlockId) -> Result<(), ConsensusError> {
    if txn.get(BUCKET_BLOCK_PATH, &height_key(height))?.is_some() {
        return Err(repeat_insert("path entry", height));
    }
    txn.put_encoded(BUCKET_BLOCK_PATH, &height_key(height), id)
}

/// The block at the tip of the canonical path.
pub fn current_block(txn: &StoreTxn<'_>) -> Result<ConsensusBlock, ConsensusError> {
    let height = block_height(txn)?;
    must_exist(get_path(txn, height).and_then(|id| get_block_map(txn, &id)))
}

// --- Coin outputs ---

pub fn get_coin_output(txn: &StoreTxn<'_>, id: &CoinOutputId) -> Result<CoinOutput, ConsensusError> {
    txn.get_decoded(BUCKET_COIN_OUTPUTS, id.as_bytes())?
        .ok_or_else(|| StateError::CoinOutputNotFound(id.to_string()).into())
}

pub fn add_coin_output(
    txn: &StoreTxn<'_>,
    id: &CoinOutputId,
    output: &CoinOutput,
) -> Result<(), ConsensusError> {
    if txn.get(BUCKET_COIN_OUTPUTS, id.as_bytes())?.is_some() {
        return Err(repeat_insert("coin output", id));
    }
    txn.put_encoded(BUCKET_COIN_OUTPUTS, id.as_bytes(), output)
}

pub fn remove_coin_output(txn: &StoreTxn<'_>, id: &CoinOutputId) -> Result<(), ConsensusError> {
    if txn.get(BUCKET_COIN_OUTPUTS, id.as_bytes())?.is_none() {
        return Err(ConsensusError::ConsistencyViolation(format!(
            "removing missing coin output {id}"
        )));
    }
    txn.delete(BUCKET_COIN_OUTPUTS, id.as_bytes())
}

// --- Block stake outputs ---

pub fn get_block_stake_output(
    txn: &StoreTxn<'_>,
    id: &BlockStakeOutputId,
) -> Result<BlockStakeOutput, ConsensusError> {
    txn.get_decoded(BUCKET_BLOCK_STAKE_OUTPUTS, id.as_bytes())?
        .ok_or_else(|| StateError::BlockStakeOutputNotFound(id.to_string()).into())
}

pub fn add_block_stake_output(
    txn: &StoreTxn<'_>,
    id: &BlockStakeOutputId,
    output: &BlockStakeOutput,
) -> Result<(), ConsensusError> {
    if txn.get(BUCKET_BLOCK_STAKE_OUTPUTS, id.as_bytes())?.is_some() {
        return Err(repeat_insert("block stake output", id));
    }
    txn.put_encoded(BUCKET_BLOCK_STAKE_OUTPUTS, id.as_bytes(), output)
}

pub fn remove_block_stake_output(
    txn: &StoreTxn<'_>,
    id: &BlockStakeOutputId,
) -> Result<(), ConsensusError> {
    if txn.get(BUCKET_BLOCK_STAKE_OUTPUTS, id.as_bytes())?.is_none() {
        return Err(ConsensusError::ConsistencyViolation(format!(
            "removing missing block stake output {id}"
        )));
    }
    txn.delete(BUCKET_BLOCK_STAKE_OUTPUTS, id.as_bytes())
}

// --- Genesis ---

/// Write the genesis block, its outputs and height 0.
pub fn init_genesis(txn: &StoreTxn<'_>, constants: &ChainConstants) -> Result<(), ConsensusError> {
    let block = constants.genesis_block();
    let id = block.id();

    for tx in &block.transactions {
        for (i, output) in tx.coin_outputs.iter().enumerate() {
            add_coin_output(txn, &tx.coin_output_id(i), output)?;
        }
        for (i, output) in tx.block_stake_outputs.iter().enumerate() {
            add_block_stake_output(txn, &tx.block_stake_output_id(i), output)?;
        }
    }

    add_block_map(
        txn,
        &ConsensusBlock {
            block,
            height: 0,
            depth: 0,
            child_target: constants.root_target,
        },
    )?;
    push_path(txn, 0, &id)?;
    set_block_height(txn, 0)
}
