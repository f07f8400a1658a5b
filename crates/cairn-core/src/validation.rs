//! The standard consensus rule set.
//!
//! Every rule is a plain function usable as a [`TransactionValidator`].
//! Rules that need outputs look them up through the [`StateReader`], so they
//! observe outputs created and consumed earlier in the same batch.
//!
//! - **Global** ([`standard_global_validators`]): run for every version.
//! - **Version one** ([`standard_version_validators`]): unlock fulfillments.

use std::collections::HashSet;

use crate::constants::TransactionValidationConstants;
use crate::crypto;
use crate::error::{ConsensusError, TransactionError};
use crate::traits::{StateReader, TransactionValidator};
use crate::types::{BlockHeight, Currency, InputKind, Timestamp, Transaction, TransactionVersion};

/// Per-call inputs to validation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    pub confirmed: bool,
    pub block_height: BlockHeight,
    pub block_time: Timestamp,
    pub is_block_creating_tx: bool,
    pub block_size_limit: u64,
    pub arbitrary_data_size_limit: u64,
    pub minimum_miner_fee: Currency,
}

impl ValidationContext {
    /// Context for a transaction being incorporated into consensus state,
    /// for real or speculatively.
    pub fn confirmed(
        constants: &TransactionValidationConstants,
        block_height: BlockHeight,
        block_time: Timestamp,
        is_block_creating_tx: bool,
    ) -> Self {
        Self {
            confirmed: true,
            block_height,
            block_time,
            is_block_creating_tx,
            block_size_limit: constants.block_size_limit,
            arbitrary_data_size_limit: constants.arbitrary_data_size_limit,
            minimum_miner_fee: constants.minimum_miner_fee,
        }
    }
}

/// Rejects transaction versions outside a fixed set.
pub struct KnownVersions(Vec<TransactionVersion>);

impl KnownVersions {
    pub fn new(versions: impl IntoIterator<Item = TransactionVersion>) -> Self {
        Self(versions.into_iter().collect())
    }
}

impl TransactionValidator for KnownVersions {
    fn validate(
        &self,
        tx: &Transaction,
        _ctx: &ValidationContext,
        _state: &dyn StateReader,
    ) -> Result<(), ConsensusError> {
        if self.0.contains(&tx.version) {
            Ok(())
        } else {
            Err(TransactionError::UnknownVersion(tx.version.0).into())
        }
    }
}

pub fn validate_size(
    tx: &Transaction,
    ctx: &ValidationContext,
    _state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    let size = tx.encoded_size()?;
    if size > ctx.block_size_limit {
        return Err(TransactionError::OversizedTransaction { size, max: ctx.block_size_limit }.into());
    }
    Ok(())
}

pub fn validate_arbitrary_data(
    tx: &Transaction,
    ctx: &ValidationContext,
    _state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    let size = tx.arbitrary_data.len() as u64;
    if size > ctx.arbitrary_data_size_limit {
        return Err(TransactionError::ArbitraryDataTooLarge {
            size,
            max: ctx.arbitrary_data_size_limit,
        }
        .into());
    }
    Ok(())
}

/// Every fee must reach the minimum. Block-creating transactions pay none.
pub fn validate_miner_fees(
    tx: &Transaction,
    ctx: &ValidationContext,
    _state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    if ctx.is_block_creating_tx {
        return Ok(());
    }
    if tx.miner_fees.is_empty() {
        return Err(TransactionError::MissingMinerFee.into());
    }
    for &fee in &tx.miner_fees {
        if fee < ctx.minimum_miner_fee {
            return Err(TransactionError::MinerFeeTooLow { fee, min: ctx.minimum_miner_fee }.into());
        }
    }
    Ok(())
}

pub fn validate_no_zero_outputs(
    tx: &Transaction,
    _ctx: &ValidationContext,
    _state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    if let Some(i) = tx.coin_outputs.iter().position(|o| o.value == 0) {
        return Err(TransactionError::ZeroValueCoinOutput(i).into());
    }
    if let Some(i) = tx.block_stake_outputs.iter().position(|o| o.value == 0) {
        return Err(TransactionError::ZeroValueBlockStakeOutput(i).into());
    }
    Ok(())
}

pub fn validate_no_double_spends(
    tx: &Transaction,
    _ctx: &ValidationContext,
    _state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    let mut coins = HashSet::with_capacity(tx.coin_inputs.len());
    for input in &tx.coin_inputs {
        if !coins.insert(input.parent_id) {
            return Err(TransactionError::DoubleSpendCoin(input.parent_id.to_string()).into());
        }
    }
    let mut stakes = HashSet::with_capacity(tx.block_stake_inputs.len());
    for input in &tx.block_stake_inputs {
        if !stakes.insert(input.parent_id) {
            return Err(TransactionError::DoubleSpendBlockStake(input.parent_id.to_string()).into());
        }
    }
    Ok(())
}

/// Coin inputs must all be unspent and equal coin outputs plus fees.
pub fn validate_coin_balance(
    tx: &Transaction,
    _ctx: &ValidationContext,
    state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    let mut inputs: Currency = 0;
    for input in &tx.coin_inputs {
        let output = state.unspent_coin_output(&input.parent_id)?;
        inputs = inputs.checked_add(output.value).ok_or(TransactionError::ValueOverflow)?;
    }
    let outputs = tx
        .total_coin_output_value()
        .and_then(|v| v.checked_add(tx.total_miner_fee()?))
        .ok_or(TransactionError::ValueOverflow)?;
    if inputs != outputs {
        return Err(TransactionError::CoinBalance { inputs, outputs }.into());
    }
    Ok(())
}

/// Block stake inputs must all be unspent and equal block stake outputs.
pub fn validate_block_stake_balance(
    tx: &Transaction,
    _ctx: &ValidationContext,
    state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    let mut inputs: Currency = 0;
    for input in &tx.block_stake_inputs {
        let output = state.unspent_block_stake_output(&input.parent_id)?;
        inputs = inputs.checked_add(output.value).ok_or(TransactionError::ValueOverflow)?;
    }
    let outputs = tx
        .total_block_stake_output_value()
        .ok_or(TransactionError::ValueOverflow)?;
    if inputs != outputs {
        return Err(TransactionError::BlockStakeBalance { inputs, outputs }.into());
    }
    Ok(())
}

/// Each input's fulfillment must satisfy the condition of the output it spends.
pub fn validate_unlock_fulfillments(
    tx: &Transaction,
    _ctx: &ValidationContext,
    state: &dyn StateReader,
) -> Result<(), ConsensusError> {
    for (i, input) in tx.coin_inputs.iter().enumerate() {
        let output = state.unspent_coin_output(&input.parent_id)?;
        crypto::verify_fulfillment(tx, InputKind::Coin, i, &output.condition, &input.fulfillment)?;
    }
    for (i, input) in tx.block_stake_inputs.iter().enumerate() {
        let output = state.unspent_block_stake_output(&input.parent_id)?;
        crypto::verify_fulfillment(
            tx,
            InputKind::BlockStake,
            i,
            &output.condition,
            &input.fulfillment,
        )?;
    }
    Ok(())
}

/// Rules run for every transaction, in order.
pub fn standard_global_validators() -> Vec<Box<dyn TransactionValidator>> {
    vec![
        Box::new(KnownVersions::new([TransactionVersion::ONE])),
        Box::new(validate_size),
        Box::new(validate_arbitrary_data),
        Box::new(validate_miner_fees),
        Box::new(validate_no_zero_outputs),
        Box::new(validate_no_double_spends),
        Box::new(validate_coin_balance),
        Box::new(validate_block_stake_balance),
    ]
}

/// Rules bound to a transaction version.
pub fn standard_version_validators() -> Vec<(TransactionVersion, Box<dyn TransactionValidator>)> {
    vec![(TransactionVersion::ONE, Box::new(validate_unlock_fulfillments))]
}
