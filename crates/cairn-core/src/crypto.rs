//! Ed25519 keys and unlock fulfillments.
//!
//! An output locked with [`UnlockCondition::PubKeyHash`] is spent by a
//! [`UnlockFulfillment::SingleSignature`] whose public key hashes (BLAKE3) to
//! the condition's hash and whose signature covers
//! [`Transaction::signature_hash`] for that input.

use ed25519_dalek::{Signer, Verifier};
use std::fmt;

use crate::error::{CryptoError, TransactionError};
use crate::types::{Hash256, InputKind, Transaction, UnlockCondition, UnlockFulfillment};

/// Ed25519 keypair for signing transaction inputs.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from 32-byte secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Unlock condition that only this keypair can fulfill.
    pub fn unlock_condition(&self) -> UnlockCondition {
        UnlockCondition::PubKeyHash(self.public_key().pubkey_hash())
    }

    /// Sign a message, returning the raw 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key: vk })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn pubkey_hash(&self) -> Hash256 {
        pubkey_hash(&self.to_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// BLAKE3 hash of raw public key bytes, as stored in unlock conditions.
pub fn pubkey_hash(pubkey_bytes: &[u8; 32]) -> Hash256 {
    Hash256(blake3::hash(pubkey_bytes).into())
}

/// Sign one input of `tx` in place.
///
/// Inputs can be signed in any order since the signature hash excludes
/// every fulfillment.
pub fn sign_input(
    tx: &mut Transaction,
    kind: InputKind,
    index: usize,
    keypair: &KeyPair,
) -> Result<(), CryptoError> {
    let len = match kind {
        InputKind::Coin => tx.coin_inputs.len(),
        InputKind::BlockStake => tx.block_stake_inputs.len(),
    };
    if index >= len {
        return Err(CryptoError::InputIndexOutOfBounds { index, len });
    }

    let sighash = tx.signature_hash(kind, index);
    let fulfillment = UnlockFulfillment::SingleSignature {
        public_key: keypair.public_key().to_bytes().to_vec(),
        signature: keypair.sign(sighash.as_bytes()).to_vec(),
    };
    match kind {
        InputKind::Coin => tx.coin_inputs[index].fulfillment = fulfillment,
        InputKind::BlockStake => tx.block_stake_inputs[index].fulfillment = fulfillment,
    }
    Ok(())
}

/// Check that `fulfillment` satisfies `condition` for input `index` of `tx`.
pub fn verify_fulfillment(
    tx: &Transaction,
    kind: InputKind,
    index: usize,
    condition: &UnlockCondition,
    fulfillment: &UnlockFulfillment,
) -> Result<(), TransactionError> {
    match (condition, fulfillment) {
        (UnlockCondition::Nil, UnlockFulfillment::Nil) => Ok(()),
        (
            UnlockCondition::PubKeyHash(expected),
            UnlockFulfillment::SingleSignature { public_key, signature },
        ) => {
            let invalid = || TransactionError::InvalidSignature { index };
            let pk_bytes: [u8; 32] = public_key.as_slice().try_into().map_err(|_| invalid())?;
            let pk = PublicKey::from_bytes(&pk_bytes).map_err(|_| invalid())?;
            if pk.pubkey_hash() != *expected {
                return Err(TransactionError::FulfillmentMismatch { index });
            }
            let sig_bytes: [u8; 64] = signature.as_slice().try_into().map_err(|_| invalid())?;
            pk.verify(tx.signature_hash(kind, index).as_bytes(), &sig_bytes)
                .map_err(|_| invalid())
        }
        _ => Err(TransactionError::FulfillmentMismatch { index }),
    }
}
