//! The Consensus Set: validation and application of transaction batches.
//!
//! Every operation registers with the shutdown coordinator, takes the set's
//! reader/writer lock, and checks the Consistency Flag inside its database
//! transaction before doing anything else.
//!
//! - [`ConsensusSet::apply_transactions`] and [`ConsensusSet::accept_block`]
//!   hold the lock for writing and commit the whole batch or nothing.
//! - [`ConsensusSet::try_transaction_set`] holds it for reading and never
//!   commits.

use std::fmt;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use cairn_core::constants::ChainConstants;
use cairn_core::error::{BlockError, ConsensusError};
use cairn_core::traits::{StateReader, TransactionValidator};
use cairn_core::types::{
    Block, BlockContext, BlockHeight, BlockId, BlockStakeOutput, BlockStakeOutputId, CoinOutput,
    CoinOutputId, ConsensusBlock, Transaction, TransactionVersion,
};
use cairn_core::validation::ValidationContext;

use crate::apply;
use crate::chain_db;
use crate::config::ConsensusConfig;
use crate::diff::{ConsensusChange, DiffHolder};
use crate::guard;
use crate::pipeline::ValidationPipeline;
use crate::plugin::{Plugin, PluginRegistry, PluginScope};
use crate::reader::TxStateReader;
use crate::store::{self, Store, StoreTxn};
use crate::thread_group::ThreadGroup;

/// Registers validators and plugins, then opens the set.
///
/// Registries are fixed once [`ConsensusSetBuilder::open`] returns.
pub struct ConsensusSetBuilder {
    constants: ChainConstants,
    pipeline: ValidationPipeline,
    plugins: PluginRegistry,
}

impl ConsensusSetBuilder {
    /// A builder with no rules at all.
    pub fn new(constants: ChainConstants) -> Self {
        Self {
            constants,
            pipeline: ValidationPipeline::new(),
            plugins: PluginRegistry::new(),
        }
    }

    /// A builder preloaded with the standard rule set.
    pub fn standard(constants: ChainConstants) -> Self {
        Self {
            pipeline: ValidationPipeline::standard(),
            ..Self::new(constants)
        }
    }

    pub fn version_validator(
        mut self,
        version: TransactionVersion,
        validator: impl TransactionValidator + 'static,
    ) -> Self {
        self.pipeline.push_version(version, Box::new(validator));
        self
    }

    pub fn global_validator(mut self, validator: impl TransactionValidator + 'static) -> Self {
        self.pipeline.push_global(Box::new(validator));
        self
    }

    pub fn plugin(
        mut self,
        name: impl Into<String>,
        scope: PluginScope,
        plugin: impl Plugin + 'static,
    ) -> Result<Self, ConsensusError> {
        self.plugins.register(name, scope, Box::new(plugin))?;
        Ok(self)
    }

    /// Open or create the store at `path` and initialize new plugin buckets.
    pub fn open(self, path: impl AsRef<Path>) -> Result<ConsensusSet, ConsensusError> {
        let constants = self.constants;
        let init = |txn: &StoreTxn<'_>| chain_db::init_genesis(txn, &constants);
        let store = Store::open_or_create(path, &init)?;

        store.update(|txn| {
            if guard::inconsistency_detected(txn)? {
                return Ok(());
            }
            self.plugins.init_buckets(txn)
        })?;

        let height = store.view(|txn| {
            if guard::inconsistency_detected(txn)? {
                return Ok(None);
            }
            chain_db::block_height(txn).map(Some)
        })?;
        info!(
            path = %store.path().display(),
            height = ?height,
            plugins = self.plugins.len(),
            "consensus set opened"
        );

        Ok(ConsensusSet {
            store: RwLock::new(store),
            tg: ThreadGroup::new(),
            pipeline: self.pipeline,
            plugins: self.plugins,
            constants,
        })
    }
}

/// Owns the store, the shutdown coordinator and the rule registries.
pub struct ConsensusSet {
    store: RwLock<Store>,
    tg: ThreadGroup,
    pipeline: ValidationPipeline,
    plugins: PluginRegistry,
    constants: ChainConstants,
}

impl fmt::Debug for ConsensusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusSet")
            .field("path", &self.store.read().path())
            .field("plugins", &self.plugins.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ConsensusSet {
    /// Open with the standard rule set and no plugins.
    pub fn open(path: impl AsRef<Path>, constants: ChainConstants) -> Result<Self, ConsensusError> {
        ConsensusSetBuilder::standard(constants).open(path)
    }

    /// Open at the configured database path.
    pub fn from_config(config: &ConsensusConfig) -> Result<Self, ConsensusError> {
        Self::open(config.db_path(), config.chain.clone())
    }

    pub fn builder(constants: ChainConstants) -> ConsensusSetBuilder {
        ConsensusSetBuilder::standard(constants)
    }

    pub fn constants(&self) -> &ChainConstants {
        &self.constants
    }

    // --- Queries ---

    /// Run a read-only lookup. A broken invariant found while reading raises
    /// the flag just like one found while applying.
    fn query<T>(
        &self,
        f: impl FnOnce(&StoreTxn<'_>) -> Result<T, ConsensusError>,
    ) -> Result<T, ConsensusError> {
        let _tg = self.tg.add()?;
        let store = self.store.read();
        let result = store.view(|txn| {
            guard::ensure_consistent(txn)?;
            f(txn)
        });
        self.settle(&store, result)
    }

    pub fn height(&self) -> Result<BlockHeight, ConsensusError> {
        self.query(chain_db::block_height)
    }

    pub fn current_block(&self) -> Result<ConsensusBlock, ConsensusError> {
        self.query(chain_db::current_block)
    }

    pub fn block_at_id(&self, id: &BlockId) -> Result<ConsensusBlock, ConsensusError> {
        self.query(|txn| TxStateReader::new(txn).block_at_id(id))
    }

    pub fn block_at_height(&self, height: BlockHeight) -> Result<ConsensusBlock, ConsensusError> {
        self.query(|txn| TxStateReader::new(txn).block_at_height(height))
    }

    pub fn unspent_coin_output(&self, id: &CoinOutputId) -> Result<CoinOutput, ConsensusError> {
        self.query(|txn| TxStateReader::new(txn).unspent_coin_output(id))
    }

    pub fn unspent_block_stake_output(
        &self,
        id: &BlockStakeOutputId,
    ) -> Result<BlockStakeOutput, ConsensusError> {
        self.query(|txn| TxStateReader::new(txn).unspent_block_stake_output(id))
    }

    /// BLAKE3 digest of the whole store. Equal digests mean equal state.
    pub fn state_digest(&self) -> Result<blake3::Hash, ConsensusError> {
        self.query(store::digest_in)
    }

    // --- Validation and application ---

    /// Validate one transaction: version rules, global rules, then plugins.
    fn validate_transaction(
        &self,
        txn: &StoreTxn<'_>,
        tx: &Transaction,
        ctx: &ValidationContext,
    ) -> Result<(), ConsensusError> {
        let reader = TxStateReader::new(txn);
        self.pipeline.validate(tx, ctx, &reader)?;
        self.plugins.validate_transaction(txn, tx, ctx, &reader)
    }

    /// Validate and stage every transaction of a batch, in order.
    fn process_batch(
        &self,
        txn: &StoreTxn<'_>,
        txns: &[Transaction],
        block: &BlockContext,
    ) -> Result<DiffHolder, ConsensusError> {
        let mut diffs = DiffHolder::new(block.height);
        for (i, tx) in txns.iter().enumerate() {
            let ctx = ValidationContext::confirmed(
                &self.constants.validation,
                block.height,
                block.timestamp,
                block.is_block_creating(i),
            );
            self.validate_transaction(txn, tx, &ctx)?;
            apply::apply_transaction(txn, &mut diffs, tx)?;
            self.plugins.apply_transaction(txn, tx, block, block.height)?;
        }
        Ok(diffs)
    }

    /// Raise the Consistency Flag if `result` reports a newly broken invariant.
    ///
    /// The transaction that found the break has already ended; the flag goes
    /// through a separate committed write.
    fn settle<T>(
        &self,
        store: &Store,
        result: Result<T, ConsensusError>,
    ) -> Result<T, ConsensusError> {
        if let Err(ConsensusError::ConsistencyViolation(reason)) = &result {
            error!(%reason, "consistency violation detected");
            if let Err(e) = store.update(guard::mark_inconsistency) {
                error!(error = %e, "failed to raise consistency flag");
            }
        }
        result
    }

    /// Apply a batch for real. All transactions are applied or none are.
    pub fn apply_transactions(
        &self,
        txns: &[Transaction],
        block: &BlockContext,
    ) -> Result<ConsensusChange, ConsensusError> {
        let _tg = self.tg.add()?;
        let store = self.store.write();
        let result = store.update(|txn| {
            guard::ensure_consistent(txn)?;
            self.process_batch(txn, txns, block)
        });
        let diffs = self.settle(&store, result)?;
        debug!(height = block.height, transactions = txns.len(), "applied transaction batch");
        Ok(diffs.into_change())
    }

    /// Report what applying `txns` on top of the current tip would change,
    /// without changing anything.
    ///
    /// Height and timestamp come from the tip. No transaction is treated as
    /// block-creating.
    pub fn try_transaction_set(
        &self,
        txns: &[Transaction],
    ) -> Result<ConsensusChange, ConsensusError> {
        let _tg = self.tg.add()?;
        let store = self.store.read();
        let result = store.speculate(|txn| {
            guard::ensure_consistent(txn)?;
            let tip = chain_db::current_block(txn)?;
            let block = BlockContext::pool(tip.height, tip.block.timestamp);
            self.process_batch(txn, txns, &block)
        });
        match self.settle(&store, result) {
            Ok(diffs) => Ok(diffs.into_change()),
            Err(e) => {
                if !e.is_consistency_violation() {
                    warn!(error = %e, transactions = txns.len(), "transaction set rejected");
                }
                Err(e)
            }
        }
    }

    /// Extend the canonical chain with `block`.
    pub fn accept_block(&self, block: &Block) -> Result<ConsensusChange, ConsensusError> {
        let _tg = self.tg.add()?;
        let store = self.store.write();
        let id = block.id();
        let result = store.update(|txn| {
            guard::ensure_consistent(txn)?;
            if chain_db::has_block(txn, &id)? {
                return Err(BlockError::DuplicateBlock(id.to_string()).into());
            }
            let parent = chain_db::current_block(txn)?;
            let parent_id = parent.block.id();
            if block.parent_id != parent_id {
                return Err(BlockError::NotExtendingTip {
                    parent: block.parent_id.to_string(),
                    tip: parent_id.to_string(),
                }
                .into());
            }
            if block.timestamp <= parent.block.timestamp {
                return Err(BlockError::TimestampNotAfterParent {
                    timestamp: block.timestamp,
                    parent: parent.block.timestamp,
                }
                .into());
            }

            let height = parent.height + 1;
            let context = BlockContext {
                height,
                timestamp: block.timestamp,
                block_creating_tx: block.block_creating_index(),
            };
            let diffs = self.process_batch(txn, &block.transactions, &context)?;

            chain_db::add_block_map(
                txn,
                &ConsensusBlock {
                    block: block.clone(),
                    height,
                    depth: parent.depth + 1,
                    child_target: parent.child_target,
                },
            )?;
            chain_db::push_path(txn, height, &id)?;
            chain_db::set_block_height(txn, height)?;
            Ok(diffs)
        });
        let diffs = self.settle(&store, result)?;
        info!(%id, height = diffs.height, transactions = block.transactions.len(), "accepted block");
        Ok(diffs.into_change())
    }

    /// Refuse new operations and wait for in-flight ones to finish.
    pub fn close(&self) -> Result<(), ConsensusError> {
        self.tg.stop()?;
        info!("consensus set closed");
        Ok(())
    }
}
