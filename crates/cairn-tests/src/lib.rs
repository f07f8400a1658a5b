//! End-to-end and adversarial test suite for the Cairn consensus engine.
//!
//! The integration tests drive a real RocksDB-backed consensus set and check
//! the all-or-nothing, no-trace and fail-fast guarantees from the outside.

pub mod helpers;
