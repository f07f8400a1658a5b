//! # cairn-consensus
//! Transactional consensus state for the Cairn chain.
//!
//! - [`store::Store`]: RocksDB-backed durable store with view / update /
//!   speculate transactions
//! - [`guard`]: persisted consistency flag
//! - [`reader::TxStateReader`]: state lookups bound to one transaction
//! - [`pipeline::ValidationPipeline`]: version-specific then global rules
//! - [`plugin::PluginRegistry`]: extensions with private buckets
//! - [`consensus_set::ConsensusSet`]: apply, speculative try, block acceptance

pub mod apply;
pub mod chain_db;
pub mod config;
pub mod consensus_set;
pub mod diff;
pub mod guard;
pub mod legacy;
pub mod logging;
pub mod pipeline;
pub mod plugin;
pub mod reader;
pub mod store;
pub mod thread_group;

pub use config::ConsensusConfig;
pub use consensus_set::{ConsensusSet, ConsensusSetBuilder};
pub use diff::{ConsensusChange, DiffDirection};
pub use plugin::{Plugin, PluginBucket, PluginScope};
