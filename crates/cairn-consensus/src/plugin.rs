//! Plugin Registry and per-plugin buckets.
//!
//! A plugin is registered under a unique name with a [`PluginScope`]. It owns
//! one namespaced region of the `plugins` bucket, handed to its hooks as a
//! [`PluginBucket`]. Validation hooks get a read-only bucket; apply hooks get
//! a writable one inside the batch's transaction, so plugin state commits or
//! rolls back together with the core state.

use tracing::info;

use cairn_core::error::ConsensusError;
use cairn_core::traits::StateReader;
use cairn_core::types::{BlockContext, BlockHeight, Transaction, TransactionVersion};
use cairn_core::validation::ValidationContext;

use crate::store::{StoreTxn, BUCKET_PLUGINS, BUCKET_PLUGIN_REGISTRY};

/// Extension hooks called by the consensus set.
pub trait Plugin: Send + Sync {
    /// Called once, the first time the plugin is registered with a store.
    fn init_bucket(&self, _bucket: &PluginBucket<'_, '_>) -> Result<(), ConsensusError> {
        Ok(())
    }

    /// May veto a transaction. Runs after all core validators.
    fn validate_transaction(
        &self,
        _tx: &Transaction,
        _ctx: &ValidationContext,
        _state: &dyn StateReader,
        _bucket: &PluginBucket<'_, '_>,
    ) -> Result<(), ConsensusError> {
        Ok(())
    }

    /// Advance plugin state for a transaction whose core diffs are staged.
    fn apply_transaction(
        &self,
        tx: &Transaction,
        block: &BlockContext,
        height: BlockHeight,
        bucket: &PluginBucket<'_, '_>,
    ) -> Result<(), ConsensusError>;
}

/// Which transactions a plugin's validation hook runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginScope {
    Global,
    Version(TransactionVersion),
}

impl PluginScope {
    pub fn covers(&self, version: TransactionVersion) -> bool {
        match self {
            Self::Global => true,
            Self::Version(v) => *v == version,
        }
    }
}

/// A plugin's private key space inside one open transaction.
pub struct PluginBucket<'t, 'a> {
    txn: &'t StoreTxn<'a>,
    name: &'t str,
    prefix: Vec<u8>,
    read_only: bool,
}

impl<'t, 'a> PluginBucket<'t, 'a> {
    fn new(txn: &'t StoreTxn<'a>, name: &'t str, read_only: bool) -> Self {
        let mut prefix = Vec::with_capacity(name.len() + 1);
        // Names are at most 255 bytes, checked on registration.
        prefix.push(name.len() as u8);
        prefix.extend_from_slice(name.as_bytes());
        Self {
            txn,
            name,
            prefix,
            read_only: read_only || !txn.is_writable(),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        full
    }

    fn check_writable(&self) -> Result<(), ConsensusError> {
        if self.read_only {
            return Err(ConsensusError::plugin(self.name, "write to read-only bucket"));
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ConsensusError> {
        self.txn.get(BUCKET_PLUGINS, &self.key(key))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), ConsensusError> {
        self.check_writable()?;
        self.txn.put(BUCKET_PLUGINS, &self.key(key), value)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), ConsensusError> {
        self.check_writable()?;
        self.txn.delete(BUCKET_PLUGINS, &self.key(key))
    }

    /// All entries in the bucket, keys without the namespace prefix.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ConsensusError> {
        let prefix_len = self.prefix.len();
        Ok(self
            .txn
            .scan(BUCKET_PLUGINS, &self.prefix)?
            .into_iter()
            .map(|(mut key, value)| (key.split_off(prefix_len), value))
            .collect())
    }
}

struct RegisteredPlugin {
    name: String,
    scope: PluginScope,
    plugin: Box<dyn Plugin>,
}

/// Plugins in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        scope: PluginScope,
        plugin: Box<dyn Plugin>,
    ) -> Result<(), ConsensusError> {
        let name = name.into();
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(ConsensusError::PluginRegistration(format!(
                "plugin name must be 1 to 255 bytes, got {}",
                name.len()
            )));
        }
        if self.plugins.iter().any(|p| p.name == name) {
            return Err(ConsensusError::PluginRegistration(format!(
                "plugin {name} registered twice"
            )));
        }
        self.plugins.push(RegisteredPlugin { name, scope, plugin });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name.as_str())
    }

    /// Initialize the bucket of every plugin new to this store.
    pub fn init_buckets(&self, txn: &StoreTxn<'_>) -> Result<(), ConsensusError> {
        for p in &self.plugins {
            if txn.get(BUCKET_PLUGIN_REGISTRY, p.name.as_bytes())?.is_some() {
                continue;
            }
            p.plugin.init_bucket(&PluginBucket::new(txn, &p.name, false))?;
            let version = match p.scope {
                PluginScope::Global => None,
                PluginScope::Version(v) => Some(v.0),
            };
            txn.put_encoded(BUCKET_PLUGIN_REGISTRY, p.name.as_bytes(), &version)?;
            info!(plugin = %p.name, "initialized plugin bucket");
        }
        Ok(())
    }

    /// Run the validation hooks of every plugin whose scope covers `tx`.
    pub fn validate_transaction(
        &self,
        txn: &StoreTxn<'_>,
        tx: &Transaction,
        ctx: &ValidationContext,
        state: &dyn StateReader,
    ) -> Result<(), ConsensusError> {
        for p in self.plugins.iter().filter(|p| p.scope.covers(tx.version)) {
            p.plugin
                .validate_transaction(tx, ctx, state, &PluginBucket::new(txn, &p.name, true))?;
        }
        Ok(())
    }

    /// Run the apply hook of every plugin.
    pub fn apply_transaction(
        &self,
        txn: &StoreTxn<'_>,
        tx: &Transaction,
        block: &BlockContext,
        height: BlockHeight,
    ) -> Result<(), ConsensusError> {
        for p in &self.plugins {
            p.plugin
                .apply_transaction(tx, block, height, &PluginBucket::new(txn, &p.name, false))?;
        }
        Ok(())
    }
}
