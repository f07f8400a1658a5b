//! Tracing subscriber setup for binaries embedding the consensus set.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use cairn_core::error::ConsensusError;

/// Install a global subscriber. `RUST_LOG` overrides `level`.
///
/// `format` is "json" or anything else for plain text. Fails if a global
/// subscriber is already installed.
pub fn init_logging(level: &str, format: &str) -> Result<(), ConsensusError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };
    result.map_err(|e| ConsensusError::Config(format!("logging: {e}")))
}
