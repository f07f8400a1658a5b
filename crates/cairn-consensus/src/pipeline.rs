//! Validation Pipeline: version-specific rules, then global rules.
//!
//! Plugin validators run after both and live in the
//! [`PluginRegistry`](crate::plugin::PluginRegistry).

use std::collections::HashMap;

use cairn_core::error::ConsensusError;
use cairn_core::traits::{StateReader, TransactionValidator};
use cairn_core::types::{Transaction, TransactionVersion};
use cairn_core::validation::{self, ValidationContext};

/// Ordered rule registry. Filled before the consensus set serves requests.
#[derive(Default)]
pub struct ValidationPipeline {
    version_mapped: HashMap<TransactionVersion, Vec<Box<dyn TransactionValidator>>>,
    global: Vec<Box<dyn TransactionValidator>>,
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard global and version-one rule set.
    pub fn standard() -> Self {
        let mut pipeline = Self::new();
        for (version, validator) in validation::standard_version_validators() {
            pipeline.push_version(version, validator);
        }
        for validator in validation::standard_global_validators() {
            pipeline.push_global(validator);
        }
        pipeline
    }

    pub fn push_version(
        &mut self,
        version: TransactionVersion,
        validator: Box<dyn TransactionValidator>,
    ) {
        self.version_mapped.entry(version).or_default().push(validator);
    }

    pub fn push_global(&mut self, validator: Box<dyn TransactionValidator>) {
        self.global.push(validator);
    }

    /// Run every matching rule and return the first failure.
    pub fn validate(
        &self,
        tx: &Transaction,
        ctx: &ValidationContext,
        state: &dyn StateReader,
    ) -> Result<(), ConsensusError> {
        if let Some(validators) = self.version_mapped.get(&tx.version) {
            for validator in validators {
                validator.validate(tx, ctx, state)?;
            }
        }
        for validator in &self.global {
            validator.validate(tx, ctx, state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::constants::TransactionValidationConstants;
    use cairn_core::error::StateError;
    use cairn_core::types::{
        BlockHeight, BlockId, BlockStakeOutput, BlockStakeOutputId, CoinOutput, CoinOutputId,
        ConsensusBlock,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct EmptyState;

    impl StateReader for EmptyState {
        fn block_at_id(&self, id: &BlockId) -> Result<ConsensusBlock, ConsensusError> {
            Err(StateError::BlockNotFound(id.to_string()).into())
        }
        fn block_at_height(&self, height: BlockHeight) -> Result<ConsensusBlock, ConsensusError> {
            Err(StateError::PathNotFound(height).into())
        }
        fn unspent_coin_output(&self, id: &CoinOutputId) -> Result<CoinOutput, ConsensusError> {
            Err(StateError::CoinOutputNotFound(id.to_string()).into())
        }
        fn unspent_block_stake_output(
            &self,
            id: &BlockStakeOutputId,
        ) -> Result<BlockStakeOutput, ConsensusError> {
            Err(StateError::BlockStakeOutputNotFound(id.to_string()).into())
        }
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, tag: &'static str, fail: bool) -> Box<dyn TransactionValidator> {
        let log = Arc::clone(log);
        Box::new(move |_: &Transaction, _: &ValidationContext, _: &dyn StateReader| {
            log.lock().push(tag);
            if fail {
                Err(ConsensusError::plugin(tag, "rejected"))
            } else {
                Ok(())
            }
        })
    }

    fn ctx() -> ValidationContext {
        ValidationContext::confirmed(&TransactionValidationConstants::default(), 1, 1, false)
    }

    #[test]
    fn version_rules_run_before_global_rules() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ValidationPipeline::new();
        pipeline.push_global(recorder(&log, "global", false));
        pipeline.push_version(TransactionVersion::ONE, recorder(&log, "v1", false));
        pipeline.push_version(TransactionVersion(2), recorder(&log, "v2", false));

        pipeline.validate(&Transaction::default(), &ctx(), &EmptyState).unwrap();
        assert_eq!(*log.lock(), vec!["v1", "global"]);
    }

    #[test]
    fn first_failure_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ValidationPipeline::new();
        pipeline.push_version(TransactionVersion::ONE, recorder(&log, "v1", true));
        pipeline.push_global(recorder(&log, "global", false));

        let err = pipeline.validate(&Transaction::default(), &ctx(), &EmptyState).unwrap_err();
        assert!(matches!(err, ConsensusError::Plugin { ref name, .. } if name == "v1"));
        assert_eq!(*log.lock(), vec!["v1"]);
    }

    #[test]
    fn standard_pipeline_rejects_feeless_tx() {
        let err = ValidationPipeline::standard()
            .validate(&Transaction::default(), &ctx(), &EmptyState)
            .unwrap_err();
        assert!(matches!(err, ConsensusError::Transaction(_)));
    }
}
