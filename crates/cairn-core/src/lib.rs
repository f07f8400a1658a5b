//! # cairn-core
//! Protocol types, consensus rules and traits for the Cairn consensus engine.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod traits;
pub mod types;
pub mod validation;
