//! Error types for the Cairn consensus engine.
use thiserror::Error;

/// A transaction violates a consensus rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown transaction version: {0}")] UnknownVersion(u8),
    #[error("oversized: {size} > {max}")] OversizedTransaction { size: u64, max: u64 },
    #[error("arbitrary data too large: {size} > {max}")] ArbitraryDataTooLarge { size: u64, max: u64 },
    #[error("transaction pays no miner fee")] MissingMinerFee,
    #[error("miner fee {fee} below minimum {min}")] MinerFeeTooLow { fee: u64, min: u64 },
    #[error("zero-value coin output at index {0}")] ZeroValueCoinOutput(usize),
    #[error("zero-value block stake output at index {0}")] ZeroValueBlockStakeOutput(usize),
    #[error("coin output {0} spent twice within the transaction")] DoubleSpendCoin(String),
    #[error("block stake output {0} spent twice within the transaction")] DoubleSpendBlockStake(String),
    #[error("coin inputs {inputs} do not equal outputs plus fees {outputs}")] CoinBalance { inputs: u64, outputs: u64 },
    #[error("block stake inputs {inputs} do not equal outputs {outputs}")] BlockStakeBalance { inputs: u64, outputs: u64 },
    #[error("value overflow")] ValueOverflow,
    #[error("fulfillment of input {index} does not match its unlock condition")] FulfillmentMismatch { index: usize },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("pubkey hash does not match unlock condition")] PubkeyHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

/// A referenced state entry is absent.
///
/// "Never existed" and "already spent" are indistinguishable here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("no block on the canonical path at height {0}")] PathNotFound(u64),
    #[error("unspent coin output not found: {0}")] CoinOutputNotFound(String),
    #[error("unspent block stake output not found: {0}")] BlockStakeOutputNotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("parent {parent} is not the current tip {tip}")] NotExtendingTip { parent: String, tip: String },
    #[error("timestamp {timestamp} not after parent timestamp {parent}")] TimestampNotAfterParent { timestamp: u64, parent: u64 },
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] State(#[from] StateError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error("plugin {name}: {reason}")] Plugin { name: String, reason: String },
    #[error("plugin registration: {0}")] PluginRegistration(String),
    #[error("storage: {0}")] Storage(String),
    #[error("database guard indicates inconsistency within database")] DatabaseInconsistent,
    #[error("consistency violation: {0}")] ConsistencyViolation(String),
    #[error("bad database version: found {found}, expected {expected}")] BadVersion { found: String, expected: String },
    #[error("bad database header: {0}")] BadHeader(String),
    #[error("consensus set is shutting down")] ShuttingDown,
    #[error("consensus set already stopped")] AlreadyStopped,
    #[error("config: {0}")] Config(String),
}

impl ConsensusError {
    /// Whether this is a typed lookup failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Whether this error means the store itself can no longer be trusted.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::DatabaseInconsistent | Self::ConsistencyViolation(_))
    }

    /// Build a plugin error from any displayable reason.
    pub fn plugin(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Plugin {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguishable_from_validation() {
        let lookup: ConsensusError = StateError::CoinOutputNotFound("ab".into()).into();
        let rule: ConsensusError = TransactionError::MissingMinerFee.into();
        assert!(lookup.is_not_found());
        assert!(!rule.is_not_found());
    }

    #[test]
    fn consistency_classes() {
        assert!(ConsensusError::DatabaseInconsistent.is_consistency_violation());
        assert!(ConsensusError::ConsistencyViolation("x".into()).is_consistency_violation());
        assert!(!ConsensusError::Storage("io".into()).is_consistency_violation());
    }

    #[test]
    fn transparent_display() {
        let err: ConsensusError = TransactionError::MinerFeeTooLow { fee: 0, min: 1 }.into();
        assert_eq!(err.to_string(), "miner fee 0 below minimum 1");
    }
}
