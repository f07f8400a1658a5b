//! Durable Store: RocksDB `TransactionDB` with one column family per bucket.
//!
//! All consensus state is read and written inside a [`StoreTxn`]. Three entry
//! points hand one out:
//!
//! - [`Store::view`]: read-only snapshot, never commits.
//! - [`Store::update`]: commits when the closure returns `Ok`, rolls back on `Err`.
//! - [`Store::speculate`]: always rolls back, whatever the closure returns.
//!
//! Write transactions are serialized by a process-wide writer lock; reads run
//! concurrently against snapshots.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, SnapshotWithThreadMode,
    TransactionDB, TransactionDBOptions,
};
use tracing::{error, info, warn};

use cairn_core::error::ConsensusError;

use crate::guard;
use crate::legacy;

// --- Bucket names ---

pub const BUCKET_METADATA: &str = "metadata";
pub const BUCKET_CONSISTENCY: &str = "consistency";
pub const BUCKET_BLOCK_MAP: &str = "block_map";
pub const BUCKET_BLOCK_PATH: &str = "block_path";
pub const BUCKET_COIN_OUTPUTS: &str = "coin_outputs";
pub const BUCKET_BLOCK_STAKE_OUTPUTS: &str = "block_stake_outputs";
pub const BUCKET_PLUGINS: &str = "plugins";
pub const BUCKET_PLUGIN_REGISTRY: &str = "plugin_registry";

/// All bucket names, in digest order.
pub const ALL_BUCKETS: &[&str] = &[
    BUCKET_METADATA,
    BUCKET_CONSISTENCY,
    BUCKET_BLOCK_MAP,
    BUCKET_BLOCK_PATH,
    BUCKET_COIN_OUTPUTS,
    BUCKET_BLOCK_STAKE_OUTPUTS,
    BUCKET_PLUGINS,
    BUCKET_PLUGIN_REGISTRY,
];

// --- Schema header ---

pub const DB_HEADER: &str = "Consensus Set Database";
pub const DB_VERSION: &str = "1.1.0";

pub(crate) const KEY_SCHEMA: &[u8] = b"schema";

/// Name and version recorded in the metadata bucket.
#[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StoreMetadata {
    pub header: String,
    pub version: String,
}

impl StoreMetadata {
    pub fn current() -> Self {
        Self {
            header: DB_HEADER.to_string(),
            version: DB_VERSION.to_string(),
        }
    }

    fn check(&self) -> Result<(), ConsensusError> {
        if self.header != DB_HEADER {
            return Err(ConsensusError::BadHeader(self.header.clone()));
        }
        if self.version != DB_VERSION {
            return Err(ConsensusError::BadVersion {
                found: self.version.clone(),
                expected: DB_VERSION.to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, ConsensusError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ConsensusError::Storage(e.to_string()))
}

/// Decode a stored value. Undecodable bytes mean the store is corrupt.
pub(crate) fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, ConsensusError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| ConsensusError::ConsistencyViolation(format!("undecodable value: {e}")))
}

fn storage(e: rocksdb::Error) -> ConsensusError {
    ConsensusError::Storage(e.to_string())
}

enum TxnInner<'a> {
    Read(SnapshotWithThreadMode<'a, TransactionDB>),
    Write(rocksdb::Transaction<'a, TransactionDB>),
}

/// One open database transaction.
pub struct StoreTxn<'a> {
    db: &'a TransactionDB,
    inner: TxnInner<'a>,
}

impl<'a> StoreTxn<'a> {
    fn cf(&self, bucket: &str) -> Result<&'a ColumnFamily, ConsensusError> {
        self.db
            .cf_handle(bucket)
            .ok_or_else(|| ConsensusError::ConsistencyViolation(format!("missing bucket {bucket}")))
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.inner, TxnInner::Write(_))
    }

    pub fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ConsensusError> {
        let cf = self.cf(bucket)?;
        let value = match &self.inner {
            TxnInner::Read(snapshot) => snapshot.get_cf(cf, key),
            TxnInner::Write(txn) => txn.get_cf(cf, key),
        };
        value.map_err(storage)
    }

    pub fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), ConsensusError> {
        let cf = self.cf(bucket)?;
        self.writer()?.put_cf(cf, key, value).map_err(storage)
    }

    pub fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), ConsensusError> {
        let cf = self.cf(bucket)?;
        self.writer()?.delete_cf(cf, key).map_err(storage)
    }

    pub(crate) fn get_decoded<T: bincode::Decode<()>>(
        &self,
        bucket: &str,
        key: &[u8],
    ) -> Result<Option<T>, ConsensusError> {
        self.get(bucket, key)?.map(|bytes| decode(&bytes)).transpose()
    }

    pub(crate) fn put_encoded<T: bincode::Encode>(
        &self,
        bucket: &str,
        key: &[u8],
        value: &T,
    ) -> Result<(), ConsensusError> {
        self.put(bucket, key, &encode(value)?)
    }

    /// Every entry in a bucket whose key starts with `prefix`, in key order.
    pub fn scan(
        &self,
        bucket: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConsensusError> {
        let cf = self.cf(bucket)?;
        let mode = IteratorMode::From(prefix, Direction::Forward);
        match &self.inner {
            TxnInner::Read(snapshot) => collect_prefixed(snapshot.iterator_cf(cf, mode), prefix),
            TxnInner::Write(txn) => collect_prefixed(txn.iterator_cf(cf, mode), prefix),
        }
    }

    fn writer(&self) -> Result<&rocksdb::Transaction<'a, TransactionDB>, ConsensusError> {
        match &self.inner {
            TxnInner::Write(txn) => Ok(txn),
            TxnInner::Read(_) => Err(ConsensusError::Storage(
                "write attempted in a read-only transaction".into(),
            )),
        }
    }

    fn commit(self) -> Result<(), ConsensusError> {
        match self.inner {
            TxnInner::Write(txn) => txn.commit().map_err(storage),
            TxnInner::Read(_) => Ok(()),
        }
    }

    fn abort(self) -> Result<(), ConsensusError> {
        match self.inner {
            TxnInner::Write(txn) => txn.rollback().map_err(storage),
            TxnInner::Read(_) => Ok(()),
        }
    }
}

type KvItem = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>;

fn collect_prefixed(
    iter: impl Iterator<Item = KvItem>,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConsensusError> {
    let mut entries = Vec::new();
    for item in iter {
        let (key, value) = item.map_err(storage)?;
        // Keys are sorted, so the first non-match ends the range.
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key.into_vec(), value.into_vec()));
    }
    Ok(entries)
}

/// Callback run inside the transaction that creates a brand-new store.
pub type InitFn<'f> = &'f dyn Fn(&StoreTxn<'_>) -> Result<(), ConsensusError>;

/// Transactional key/value store holding all consensus state.
pub struct Store {
    db: TransactionDB,
    writer: Mutex<()>,
    path: PathBuf,
}

impl Store {
    /// Open an existing store, or initialize a new one.
    ///
    /// An outdated schema is converted in place. If conversion reports the
    /// store as unreadable, the store directory is renamed to `<path>.bck`
    /// and a fresh store is created in its place.
    pub fn open_or_create(path: impl AsRef<Path>, init: InitFn<'_>) -> Result<Self, ConsensusError> {
        let path = path.as_ref();
        match Self::open(path, init) {
            Err(ConsensusError::BadVersion { found, expected }) => {
                info!(%found, %expected, "consensus database has an outdated schema, converting");
            }
            other => return other,
        }

        match legacy::convert(path) {
            Ok(()) => return Self::open(path, init),
            Err(ConsensusError::BadVersion { found, .. }) => {
                warn!(
                    path = %path.display(),
                    %found,
                    "consensus database cannot be converted, backing it up and creating a new one"
                );
            }
            Err(e) => return Err(e),
        }

        replace(path)?;
        Self::open(path, init)
    }

    /// Open a store at the current schema version.
    ///
    /// A store without a schema header is initialized: header, consistency
    /// flag and whatever `init` writes go into one transaction.
    pub fn open(path: impl AsRef<Path>, init: InitFn<'_>) -> Result<Self, ConsensusError> {
        let store = Self::open_raw(path)?;

        let metadata: Option<StoreMetadata> =
            store.view(|txn| txn.get_decoded(BUCKET_METADATA, KEY_SCHEMA))?;
        match metadata {
            Some(metadata) => metadata.check()?,
            None => {
                store.update(|txn| {
                    txn.put_encoded(BUCKET_METADATA, KEY_SCHEMA, &StoreMetadata::current())?;
                    guard::set_flag(txn, false)?;
                    init(txn)
                })?;
                info!(path = %store.path.display(), "initialized consensus database");
            }
        }

        if store.view(guard::inconsistency_detected)? {
            error!(
                path = %store.path.display(),
                "consensus database is marked inconsistent, refusing to serve requests"
            );
        }
        Ok(store)
    }

    /// Open the underlying database without looking at its contents.
    pub(crate) fn open_raw(path: impl AsRef<Path>) -> Result<Self, ConsensusError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = ALL_BUCKETS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &db_opts,
            &TransactionDBOptions::default(),
            path.as_ref(),
            cf_descriptors,
        )
        .map_err(storage)?;

        Ok(Self {
            db,
            writer: Mutex::new(()),
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against a read-only snapshot.
    pub fn view<T>(
        &self,
        f: impl FnOnce(&StoreTxn<'_>) -> Result<T, ConsensusError>,
    ) -> Result<T, ConsensusError> {
        let txn = StoreTxn {
            db: &self.db,
            inner: TxnInner::Read(self.db.snapshot()),
        };
        f(&txn)
    }

    /// Run `f` in a write transaction, committing only if it succeeds.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&StoreTxn<'_>) -> Result<T, ConsensusError>,
    ) -> Result<T, ConsensusError> {
        let _writer = self.writer.lock();
        let txn = self.begin_write();
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }

    /// Run `f` in a write transaction that is rolled back whatever it returns.
    pub fn speculate<T>(
        &self,
        f: impl FnOnce(&StoreTxn<'_>) -> Result<T, ConsensusError>,
    ) -> Result<T, ConsensusError> {
        let _writer = self.writer.lock();
        let txn = self.begin_write();
        let result = f(&txn);
        txn.abort()?;
        result
    }

    fn begin_write(&self) -> StoreTxn<'_> {
        StoreTxn {
            db: &self.db,
            inner: TxnInner::Write(self.db.transaction()),
        }
    }

    /// BLAKE3 digest over every bucket's contents.
    pub fn digest(&self) -> Result<blake3::Hash, ConsensusError> {
        self.view(digest_in)
    }
}

/// BLAKE3 digest over every bucket as seen by `txn`.
pub fn digest_in(txn: &StoreTxn<'_>) -> Result<blake3::Hash, ConsensusError> {
    let mut hasher = blake3::Hasher::new();
    for bucket in ALL_BUCKETS {
        hasher.update(bucket.as_bytes());
        for (key, value) in txn.scan(bucket, &[])? {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(&key);
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(&value);
        }
    }
    Ok(hasher.finalize())
}

/// Move an unreadable store out of the way.
fn replace(path: &Path) -> Result<(), ConsensusError> {
    let mut backup = OsString::from(path.as_os_str());
    backup.push(".bck");
    let backup = PathBuf::from(backup);
    if backup.exists() {
        warn!(backup = %backup.display(), "removing stale consensus database backup");
        std::fs::remove_dir_all(&backup).map_err(|e| ConsensusError::Storage(e.to_string()))?;
    }
    std::fs::rename(path, &backup).map_err(|e| ConsensusError::Storage(e.to_string()))?;
    warn!(
        path = %path.display(),
        backup = %backup.display(),
        "moved unreadable consensus database to backup"
    );
    Ok(())
}
