//! Trait interfaces between the rule set and the state engine.
//!
//! - [`StateReader`]: read-only lookups against one open database transaction
//!   (cairn-consensus implements)
//! - [`TransactionValidator`]: one consensus rule, run by the validation
//!   pipeline

use crate::error::ConsensusError;
use crate::types::{
    BlockHeight, BlockId, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId,
    ConsensusBlock, Transaction,
};
use crate::validation::ValidationContext;

/// Read-only view of consensus state as seen by one database transaction.
///
/// Lookups fail with [`StateError`](crate::error::StateError) when the key is
/// absent. The same error is returned for an output that never existed and
/// for one that was already spent.
pub trait StateReader {
    fn block_at_id(&self, id: &BlockId) -> Result<ConsensusBlock, ConsensusError>;

    /// Block on the canonical path at `height`.
    fn block_at_height(&self, height: BlockHeight) -> Result<ConsensusBlock, ConsensusError>;

    fn unspent_coin_output(&self, id: &CoinOutputId) -> Result<CoinOutput, ConsensusError>;

    fn unspent_block_stake_output(
        &self,
        id: &BlockStakeOutputId,
    ) -> Result<BlockStakeOutput, ConsensusError>;
}

/// A single consensus rule.
///
/// Validators must not mutate state. They see outputs staged earlier in the
/// same batch through the [`StateReader`].
pub trait TransactionValidator: Send + Sync {
    fn validate(
        &self,
        tx: &Transaction,
        ctx: &ValidationContext,
        state: &dyn StateReader,
    ) -> Result<(), ConsensusError>;
}

impl<F> TransactionValidator for F
where
    F: Fn(&Transaction, &ValidationContext, &dyn StateReader) -> Result<(), ConsensusError>
        + Send
        + Sync,
{
    fn validate(
        &self,
        tx: &Transaction,
        ctx: &ValidationContext,
        state: &dyn StateReader,
    ) -> Result<(), ConsensusError> {
        self(tx, ctx, state)
    }
}
