//! Signing seam: the ledger only ever talks to a [`SigningProvider`], never to a
//! concrete curve, so tests and alternative schemes can be plugged in.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::constants::ADDRESS_HEX_LEN;
use crate::transaction::Address;

pub trait SigningProvider {
    type KeyPair;

    fn generate_key_pair(&self) -> Self::KeyPair;
    fn public_key_of(&self, key_pair: &Self::KeyPair) -> Vec<u8>;
    fn sign(&self, key_pair: &Self::KeyPair, message: &[u8]) -> Vec<u8>;
    /// Malformed keys or signatures verify as `false`.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 provider backed by the OS RNG for key generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Provider;

impl Ed25519Provider {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic key pair from a 32-byte secret seed.
    pub fn key_pair_from_seed(&self, seed: &[u8; 32]) -> SigningKey {
        SigningKey::from_bytes(seed)
    }
}

impl SigningProvider for Ed25519Provider {
    type KeyPair = SigningKey;

    fn generate_key_pair(&self) -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn public_key_of(&self, key_pair: &SigningKey) -> Vec<u8> {
        key_pair.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, key_pair: &SigningKey, message: &[u8]) -> Vec<u8> {
        key_pair.sign(message).to_bytes().to_vec()
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(raw) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying) = VerifyingKey::from_bytes(&raw) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying.verify(message, &signature).is_ok()
    }
}

/// Wallet address of a public key: the first `ADDRESS_HEX_LEN` hex characters
/// of `sha256(public_key)`. Used both when issuing wallets and when binding a
/// signature to a sender.
pub fn derive_address(public_key: &[u8]) -> Address {
    let mut hex = hex::encode(Sha256::digest(public_key));
    hex.truncate(ADDRESS_HEX_LEN);
    Address::new(hex)
}

/// Address of the key pair as seen by `provider`.
pub fn address_of<P: SigningProvider>(provider: &P, key_pair: &P::KeyPair) -> Address {
    derive_address(&provider.public_key_of(key_pair))
}
