//! Core protocol types: identifiers, outputs, transactions, blocks.
//!
//! All monetary values are in base units (see [`ONE_COIN`](crate::constants::ONE_COIN)).
//! Identifiers are BLAKE3 hashes over a fixed, explicitly written byte layout so
//! they do not depend on the storage encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransactionError;

/// Block height on the canonical chain. Genesis is height 0.
pub type BlockHeight = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Amount of coins or block stakes in base units.
pub type Currency = u64;

/// A 32-byte hash value.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<blake3::Hash> for Hash256 {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.into())
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            Default, bincode::Encode, bincode::Decode,
        )]
        pub struct $name(pub Hash256);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Hash256> for $name {
            fn from(hash: Hash256) -> Self {
                Self(hash)
            }
        }
    };
}

hash_id!(
    /// Identifier of a block.
    BlockId
);
hash_id!(
    /// Identifier of a transaction.
    TransactionId
);
hash_id!(
    /// Identifier of a coin output, derived from its transaction and index.
    CoinOutputId
);
hash_id!(
    /// Identifier of a block stake output, derived from its transaction and index.
    BlockStakeOutputId
);
hash_id!(
    /// Difficulty target handed down to child blocks.
    Target
);

/// Transaction version tag. Validators and plugins can be bound to one.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct TransactionVersion(pub u8);

impl TransactionVersion {
    /// Legacy version, no longer accepted by the standard rule set.
    pub const ZERO: Self = Self(0);
    /// Current default version.
    pub const ONE: Self = Self(1);
}

impl Default for TransactionVersion {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for TransactionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Spending condition attached to an output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub enum UnlockCondition {
    /// Anyone may spend the output.
    #[default]
    Nil,
    /// The spender must prove ownership of the ed25519 key hashing to this value.
    PubKeyHash(Hash256),
}

impl UnlockCondition {
    fn write_canonical(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::Nil => {
                hasher.update(&[0]);
            }
            Self::PubKeyHash(hash) => {
                hasher.update(&[1]);
                hasher.update(hash.as_bytes());
            }
        }
    }
}

/// Proof that an input may spend the output it references.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub enum UnlockFulfillment {
    /// Fulfills [`UnlockCondition::Nil`].
    #[default]
    Nil,
    /// Ed25519 public key (32 bytes) and signature (64 bytes).
    SingleSignature { public_key: Vec<u8>, signature: Vec<u8> },
}

impl UnlockFulfillment {
    fn write_canonical(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::Nil => {
                hasher.update(&[0]);
            }
            Self::SingleSignature { public_key, signature } => {
                hasher.update(&[1]);
                write_bytes(hasher, public_key);
                write_bytes(hasher, signature);
            }
        }
    }
}

/// A value-bearing coin output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CoinOutput {
    pub value: Currency,
    pub condition: UnlockCondition,
}

/// Spends a previously created coin output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CoinInput {
    pub parent_id: CoinOutputId,
    pub fulfillment: UnlockFulfillment,
}

/// A block stake output. Block stakes are what block creators stake with.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockStakeOutput {
    pub value: Currency,
    pub condition: UnlockCondition,
}

/// Spends a previously created block stake output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockStakeInput {
    pub parent_id: BlockStakeOutputId,
    pub fulfillment: UnlockFulfillment,
}

/// Which input list a signature hash commits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Coin,
    BlockStake,
}

/// A transaction moving coins and block stakes.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub version: TransactionVersion,
    pub coin_inputs: Vec<CoinInput>,
    pub coin_outputs: Vec<CoinOutput>,
    pub block_stake_inputs: Vec<BlockStakeInput>,
    pub block_stake_outputs: Vec<BlockStakeOutput>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<u8>,
}

impl Transaction {
    /// Transaction identifier. Commits to every field, fulfillments included.
    pub fn id(&self) -> TransactionId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"transaction");
        self.write_canonical(&mut hasher, true);
        TransactionId(hasher.finalize().into())
    }

    /// Identifier of the coin output at `index`.
    pub fn coin_output_id(&self, index: usize) -> CoinOutputId {
        CoinOutputId(derive_output_id(b"coin output", &self.id(), index))
    }

    /// Identifier of the block stake output at `index`.
    pub fn block_stake_output_id(&self, index: usize) -> BlockStakeOutputId {
        BlockStakeOutputId(derive_output_id(b"blockstake output", &self.id(), index))
    }

    /// Hash signed by the fulfillment of one input.
    ///
    /// Excludes every fulfillment so inputs can be signed in any order.
    pub fn signature_hash(&self, kind: InputKind, index: usize) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"signature");
        self.write_canonical(&mut hasher, false);
        hasher.update(&[match kind {
            InputKind::Coin => 0,
            InputKind::BlockStake => 1,
        }]);
        hasher.update(&(index as u64).to_le_bytes());
        hasher.finalize().into()
    }

    /// Size of the storage encoding in bytes.
    pub fn encoded_size(&self) -> Result<u64, TransactionError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map(|bytes| bytes.len() as u64)
            .map_err(|e| TransactionError::Serialization(e.to_string()))
    }

    /// Sum of all coin output values. Returns None on overflow.
    pub fn total_coin_output_value(&self) -> Option<Currency> {
        self.coin_outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Sum of all miner fees. Returns None on overflow.
    pub fn total_miner_fee(&self) -> Option<Currency> {
        self.miner_fees
            .iter()
            .try_fold(0u64, |acc, fee| acc.checked_add(*fee))
    }

    /// Sum of all block stake output values. Returns None on overflow.
    pub fn total_block_stake_output_value(&self) -> Option<Currency> {
        self.block_stake_outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// A block creator's stake respend: only block stakes move, no fees.
    pub fn is_block_stake_respend(&self) -> bool {
        self.coin_inputs.is_empty()
            && self.coin_outputs.is_empty()
            && self.miner_fees.is_empty()
            && !self.block_stake_inputs.is_empty()
    }

    fn write_canonical(&self, hasher: &mut blake3::Hasher, with_fulfillments: bool) {
        hasher.update(&[self.version.0]);

        hasher.update(&(self.coin_inputs.len() as u64).to_le_bytes());
        for input in &self.coin_inputs {
            hasher.update(input.parent_id.as_bytes());
            if with_fulfillments {
                input.fulfillment.write_canonical(hasher);
            }
        }
        hasher.update(&(self.coin_outputs.len() as u64).to_le_bytes());
        for output in &self.coin_outputs {
            hasher.update(&output.value.to_le_bytes());
            output.condition.write_canonical(hasher);
        }

        hasher.update(&(self.block_stake_inputs.len() as u64).to_le_bytes());
        for input in &self.block_stake_inputs {
            hasher.update(input.parent_id.as_bytes());
            if with_fulfillments {
                input.fulfillment.write_canonical(hasher);
            }
        }
        hasher.update(&(self.block_stake_outputs.len() as u64).to_le_bytes());
        for output in &self.block_stake_outputs {
            hasher.update(&output.value.to_le_bytes());
            output.condition.write_canonical(hasher);
        }

        hasher.update(&(self.miner_fees.len() as u64).to_le_bytes());
        for fee in &self.miner_fees {
            hasher.update(&fee.to_le_bytes());
        }
        write_bytes(hasher, &self.arbitrary_data);
    }
}

fn write_bytes(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn derive_output_id(specifier: &[u8], txid: &TransactionId, index: usize) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(specifier);
    hasher.update(txid.as_bytes());
    hasher.update(&(index as u64).to_le_bytes());
    hasher.finalize().into()
}

/// A block: an ordered batch of transactions on top of a parent.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub parent_id: BlockId,
    pub timestamp: Timestamp,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block identifier over parent, timestamp and transaction ids.
    pub fn id(&self) -> BlockId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"block");
        hasher.update(self.parent_id.as_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            hasher.update(tx.id().as_bytes());
        }
        BlockId(hasher.finalize().into())
    }

    /// Index of the block-creating transaction, if the block carries one.
    ///
    /// Only the first transaction can be block-creating, and only when it is
    /// a pure block stake respend.
    pub fn block_creating_index(&self) -> Option<usize> {
        self.transactions
            .first()
            .filter(|tx| tx.is_block_stake_respend())
            .map(|_| 0)
    }
}

/// A block as recorded in the consensus store.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ConsensusBlock {
    pub block: Block,
    pub height: BlockHeight,
    /// Cumulative depth of the chain ending in this block.
    pub depth: u64,
    /// Difficulty target for blocks built on top of this one.
    pub child_target: Target,
}

/// Block-level context a batch of transactions is applied under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockContext {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    /// Index of the block-creating transaction within the batch.
    pub block_creating_tx: Option<usize>,
}

impl BlockContext {
    /// Context for transactions that sit in a pool rather than a block.
    pub fn pool(height: BlockHeight, timestamp: Timestamp) -> Self {
        Self {
            height,
            timestamp,
            block_creating_tx: None,
        }
    }

    /// Whether the transaction at `index` in the batch is block-creating.
    pub fn is_block_creating(&self, index: usize) -> bool {
        self.block_creating_tx == Some(index)
    }
}
