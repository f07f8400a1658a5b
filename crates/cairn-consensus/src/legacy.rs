//! In-place conversion of older on-disk schemas.
//!
//! Schema `1.0.0` kept the consistency flag in the metadata bucket. Converting
//! moves it into its own bucket and stamps the current version, in one
//! transaction. Any other version cannot be converted.

use std::path::Path;

use tracing::info;

use cairn_core::error::ConsensusError;

use crate::guard;
use crate::store::{
    Store, StoreMetadata, BUCKET_METADATA, DB_HEADER, DB_VERSION, KEY_SCHEMA,
};

pub const LEGACY_VERSION: &str = "1.0.0";

const LEGACY_KEY_CONSISTENCY: &[u8] = b"consistency";

/// Convert the store at `path` to the current schema.
///
/// Returns [`ConsensusError::BadVersion`] when the store's version is not one
/// this function knows how to convert.
pub fn convert(path: &Path) -> Result<(), ConsensusError> {
    let store = Store::open_raw(path)?;
    store.update(|txn| {
        let metadata: StoreMetadata = txn
            .get_decoded(BUCKET_METADATA, KEY_SCHEMA)?
            .ok_or_else(|| ConsensusError::BadHeader("missing schema header".into()))?;
        if metadata.header != DB_HEADER {
            return Err(ConsensusError::BadHeader(metadata.header));
        }
        if metadata.version != LEGACY_VERSION {
            return Err(ConsensusError::BadVersion {
                found: metadata.version,
                expected: DB_VERSION.to_string(),
            });
        }

        let inconsistent = txn
            .get_decoded::<bool>(BUCKET_METADATA, LEGACY_KEY_CONSISTENCY)?
            .unwrap_or(false);
        guard::set_flag(txn, inconsistent)?;
        txn.delete(BUCKET_METADATA, LEGACY_KEY_CONSISTENCY)?;
        txn.put_encoded(BUCKET_METADATA, KEY_SCHEMA, &StoreMetadata::current())
    })?;
    info!(path = %path.display(), from = LEGACY_VERSION, to = DB_VERSION, "converted consensus database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreTxn, BUCKET_PLUGINS};

    fn no_init(_: &StoreTxn<'_>) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn write_legacy(path: &Path, version: &str, flag: Option<bool>) {
        let store = Store::open_raw(path).unwrap();
        let metadata = StoreMetadata { header: DB_HEADER.into(), version: version.into() };
        store
            .update(|txn| {
                txn.put_encoded(BUCKET_METADATA, KEY_SCHEMA, &metadata)?;
                if let Some(flag) = flag {
                    txn.put_encoded(BUCKET_METADATA, LEGACY_KEY_CONSISTENCY, &flag)?;
                }
                txn.put(BUCKET_PLUGINS, b"kept", b"yes")
            })
            .unwrap();
    }

    #[test]
    fn converts_and_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.db");
        write_legacy(&path, LEGACY_VERSION, Some(false));

        let store = Store::open_or_create(&path, &no_init).unwrap();
        assert!(!store.view(guard::inconsistency_detected).unwrap());
        assert_eq!(
            store.view(|txn| txn.get(BUCKET_PLUGINS, b"kept")).unwrap().as_deref(),
            Some(&b"yes"[..])
        );
        assert_eq!(store.view(|txn| txn.get(BUCKET_METADATA, LEGACY_KEY_CONSISTENCY)).unwrap(), None);
        assert!(!dir.path().join("consensus.db.bck").exists());
    }

    #[test]
    fn carries_raised_flag_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.db");
        write_legacy(&path, LEGACY_VERSION, Some(true));

        let store = Store::open_or_create(&path, &no_init).unwrap();
        assert!(store.view(guard::inconsistency_detected).unwrap());
    }

    #[test]
    fn missing_legacy_flag_means_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.db");
        write_legacy(&path, LEGACY_VERSION, None);

        convert(&path).unwrap();
        let store = Store::open(&path, &no_init).unwrap();
        assert!(!store.view(guard::inconsistency_detected).unwrap());
    }

    #[test]
    fn other_versions_are_bad_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.db");
        write_legacy(&path, "0.5.0", None);

        assert!(matches!(convert(&path), Err(ConsensusError::BadVersion { .. })));
    }
}
