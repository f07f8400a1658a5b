//! Consistency Guard: the persisted flag that marks a store as untrustworthy.
//!
//! The flag is `false` under normal operation. Once raised it stays raised
//! until the store is repaired out of band, and every consensus operation
//! fails with [`ConsensusError::DatabaseInconsistent`].

use tracing::error;

use cairn_core::error::ConsensusError;

use crate::store::{StoreTxn, BUCKET_CONSISTENCY};

const KEY_CONSISTENCY: &[u8] = b"consistency";

/// Whether a previous run flagged the store as inconsistent.
pub fn inconsistency_detected(txn: &StoreTxn<'_>) -> Result<bool, ConsensusError> {
    txn.get_decoded::<bool>(BUCKET_CONSISTENCY, KEY_CONSISTENCY)?
        .ok_or_else(|| ConsensusError::ConsistencyViolation("consistency flag missing".into()))
}

/// Raise the flag. Must be committed to take effect.
pub fn mark_inconsistency(txn: &StoreTxn<'_>) -> Result<(), ConsensusError> {
    error!("marking consensus database as inconsistent");
    set_flag(txn, true)
}

pub(crate) fn set_flag(txn: &StoreTxn<'_>, inconsistent: bool) -> Result<(), ConsensusError> {
    txn.put_encoded(BUCKET_CONSISTENCY, KEY_CONSISTENCY, &inconsistent)
}

/// Fail fast when the flag is raised.
pub fn ensure_consistent(txn: &StoreTxn<'_>) -> Result<(), ConsensusError> {
    if inconsistency_detected(txn)? {
        return Err(ConsensusError::DatabaseInconsistent);
    }
    Ok(())
}
