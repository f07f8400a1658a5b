//! State Reader bound to one open database transaction.

use cairn_core::error::ConsensusError;
use cairn_core::traits::StateReader;
use cairn_core::types::{
    BlockHeight, BlockId, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId,
    ConsensusBlock,
};

use crate::chain_db;
use crate::store::StoreTxn;

/// Read-only lookups against one transaction.
///
/// Inside a write transaction the reader sees outputs created and removed
/// earlier in the same transaction.
pub struct TxStateReader<'t, 'a> {
    txn: &'t StoreTxn<'a>,
}

impl<'t, 'a> TxStateReader<'t, 'a> {
    pub fn new(txn: &'t StoreTxn<'a>) -> Self {
        Self { txn }
    }
}

impl StateReader for TxStateReader<'_, '_> {
    fn block_at_id(&self, id: &BlockId) -> Result<ConsensusBlock, ConsensusError> {
        chain_db::get_block_map(self.txn, id)
    }

    fn block_at_height(&self, height: BlockHeight) -> Result<ConsensusBlock, ConsensusError> {
        let id = chain_db::get_path(self.txn, height)?;
        self.block_at_id(&id)
    }

    fn unspent_coin_output(&self, id: &CoinOutputId) -> Result<CoinOutput, ConsensusError> {
        chain_db::get_coin_output(self.txn, id)
    }

    fn unspent_block_stake_output(
        &self,
        id: &BlockStakeOutputId,
    ) -> Result<BlockStakeOutput, ConsensusError> {
        chain_db::get_block_stake_output(self.txn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use cairn_core::constants::ChainConstants;
    use cairn_core::types::{Hash256, UnlockCondition};

    #[test]
    fn sees_staged_writes_in_its_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let c = ChainConstants::devnet();
        let init = move |txn: &StoreTxn<'_>| chain_db::init_genesis(txn, &c);
        let store = Store::open_or_create(dir.path().join("consensus.db"), &init).unwrap();

        let id = CoinOutputId(Hash256([4; 32]));
        let out = CoinOutput { value: 9, condition: UnlockCondition::Nil };
        store
            .speculate(|txn| {
                let reader = TxStateReader::new(txn);
                assert!(reader.unspent_coin_output(&id).unwrap_err().is_not_found());
                chain_db::add_coin_output(txn, &id, &out)?;
                assert_eq!(reader.unspent_coin_output(&id)?, out);
                chain_db::remove_coin_output(txn, &id)?;
                assert!(reader.unspent_coin_output(&id).unwrap_err().is_not_found());
                Ok(())
            })
            .unwrap();

        let genesis = store.view(|txn| TxStateReader::new(txn).block_at_height(0)).unwrap();
        assert_eq!(genesis.height, 0);
        assert!(
            store
                .view(|txn| TxStateReader::new(txn).block_at_height(1))
                .unwrap_err()
                .is_not_found()
        );
    }
}
