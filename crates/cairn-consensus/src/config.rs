//! Configuration for an embedded consensus set.
//!
//! [`ConsensusConfig::load`] layers an optional config file under `CAIRN__*`
//! environment variables, e.g. `CAIRN__LOG_LEVEL=debug` or
//! `CAIRN__CHAIN__VALIDATION__MINIMUM_MINER_FEE=1`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cairn_core::constants::ChainConstants;
use cairn_core::error::ConsensusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "cairn_consensus=debug").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    pub chain: ChainConstants,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cairn");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            chain: ChainConstants::default(),
        }
    }
}

impl ConsensusConfig {
    /// Path to the consensus database directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("consensus.db")
    }

    /// Load from `path` (if it exists) and the environment, over defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConsensusError> {
        ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("CAIRN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConsensusError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_settings() {
        let cfg = ConsensusConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, "text");
    }

    #[test]
    fn default_data_dir_ends_with_cairn() {
        let cfg = ConsensusConfig::default();
        assert!(cfg.data_dir.ends_with("cairn"), "data_dir: {:?}", cfg.data_dir);
    }

    #[test]
    fn db_path_appends_consensus_db() {
        let cfg = ConsensusConfig {
            data_dir: PathBuf::from("/tmp/cairn-test"),
            ..ConsensusConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/cairn-test/consensus.db"));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConsensusConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.chain, ChainConstants::default());
    }

    #[test]
    fn load_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cairn.toml");
        std::fs::write(
            &path,
            "data_dir = \"/var/lib/cairn\"\nlog_format = \"json\"\n\n[chain.validation]\nminimum_miner_fee = 5\n",
        )
        .unwrap();

        let cfg = ConsensusConfig::load(&path).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/cairn"));
        assert_eq!(cfg.log_format, "json");
        assert_eq!(cfg.chain.validation.minimum_miner_fee, 5);
        assert_eq!(
            cfg.chain.validation.block_size_limit,
            ChainConstants::default().validation.block_size_limit
        );
    }
}
