use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::block::Hash;
use crate::crypto::{address_of, derive_address, SigningProvider};
use crate::error::TxError;
use crate::now_millis;

/// Transfer value. Signed on purpose: the ledger does not police the sign or
/// magnitude of an amount.
pub type Amount = i64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Origin of a transfer. `System` is the coinbase sentinel and needs no signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    System,
    Account(Address),
}

impl Sender {
    pub fn address(&self) -> Option<&Address> {
        match self {
            Sender::System => None,
            Sender::Account(addr) => Some(addr),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: u64,
    pub from: Sender,
    pub to: Address,
    pub amount: Amount,
    pub signer_public_key: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

impl Transaction {
    /// Unsigned transfer from `from` to `to`, stamped with the current time.
    pub fn new(from: impl Into<Address>, to: impl Into<Address>, amount: Amount) -> Self {
        Self::with_sender(Sender::Account(from.into()), to.into(), amount)
    }

    /// System issuance (coinbase). Valid without a signature.
    pub fn system(to: impl Into<Address>, amount: Amount) -> Self {
        Self::with_sender(Sender::System, to.into(), amount)
    }

    fn with_sender(from: Sender, to: Address, amount: Amount) -> Self {
        Self {
            timestamp: now_millis(),
            from,
            to,
            amount,
            signer_public_key: None,
            signature: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_system(&self) -> bool {
        matches!(self.from, Sender::System)
    }

    pub fn is_signed(&self) -> bool {
        self.signer_public_key.is_some() && self.signature.is_some()
    }

    /// True if `address` is the sender or the recipient.
    pub fn involves(&self, address: &Address) -> bool {
        &self.to == address || self.from.address() == Some(address)
    }

    /// Digest over sender, recipient and amount only. The timestamp is left
    /// out, so two transfers differing only in submission time share it.
    pub fn fingerprint(&self) -> Hash {
        let mut buf = Vec::with_capacity(64);
        self.encode_claim(&mut buf);
        Sha256::digest(&buf).into()
    }

    /// Full canonical encoding, signature material included. Block hashes
    /// commit to this, so it must stay byte-stable across platforms.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(192);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        self.encode_claim(&mut buf);
        put_optional_bytes(&mut buf, self.signer_public_key.as_deref());
        put_optional_bytes(&mut buf, self.signature.as_deref());
        buf
    }

    fn encode_claim(&self, buf: &mut Vec<u8>) {
        match &self.from {
            Sender::System => buf.push(0),
            Sender::Account(addr) => {
                buf.push(1);
                put_bytes(buf, addr.as_str().as_bytes());
            }
        }
        put_bytes(buf, self.to.as_str().as_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
    }

    /// Signs the fingerprint with `key_pair`. Refused, leaving the transaction
    /// untouched, when the key does not derive the claimed sender address.
    /// Signing again overwrites a previous signature.
    pub fn sign<P: SigningProvider>(
        &mut self,
        provider: &P,
        key_pair: &P::KeyPair,
    ) -> Result<(), TxError> {
        let derived = address_of(provider, key_pair);
        match &self.from {
            Sender::Account(claimed) if *claimed == derived => {}
            Sender::Account(claimed) => {
                return Err(TxError::SenderMismatch {
                    derived: derived.to_string(),
                    claimed: claimed.to_string(),
                })
            }
            Sender::System => {
                return Err(TxError::SenderMismatch {
                    derived: derived.to_string(),
                    claimed: "<system>".to_string(),
                })
            }
        }
        let signature = provider.sign(key_pair, &self.fingerprint());
        self.signer_public_key = Some(provider.public_key_of(key_pair));
        self.signature = Some(signature);
        Ok(())
    }

    /// Checks the signature and that the signer key derives the sender address.
    pub fn verify<P: SigningProvider>(&self, provider: &P) -> Result<(), TxError> {
        let Sender::Account(from) = &self.from else {
            return Ok(());
        };
        let (Some(public_key), Some(signature)) = (&self.signer_public_key, &self.signature)
        else {
            return Err(TxError::Unsigned);
        };
        if derive_address(public_key) != *from {
            return Err(TxError::SignerNotSender);
        }
        if !provider.verify(public_key, &self.fingerprint(), signature) {
            return Err(TxError::BadSignature);
        }
        Ok(())
    }

    pub fn is_valid<P: SigningProvider>(&self, provider: &P) -> bool {
        self.verify(provider).is_ok()
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn put_optional_bytes(buf: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        None => buf.push(0),
        Some(bytes) => {
            buf.push(1);
            put_bytes(buf, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Provider;

    fn wallet(provider: &Ed25519Provider, seed: u8) -> (ed25519_dalek::SigningKey, Address) {
        let key = provider.key_pair_from_seed(&[seed; 32]);
        let addr = address_of(provider, &key);
        (key, addr)
    }

    #[test]
    fn fingerprint_ignores_timestamp() {
        let a = Transaction::new("alice", "bob", 10).with_timestamp(1);
        let b = Transaction::new("alice", "bob", 10).with_timestamp(2);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn fingerprint_covers_every_claim_field() {
        let base = Transaction::new("alice", "bob", 10);
        assert_ne!(base.fingerprint(), Transaction::new("alice", "bob", 11).fingerprint());
        assert_ne!(base.fingerprint(), Transaction::new("alice", "carol", 10).fingerprint());
        assert_ne!(base.fingerprint(), Transaction::new("eve", "bob", 10).fingerprint());
        assert_ne!(base.fingerprint(), Transaction::system("bob", 10).fingerprint());
    }

    #[test]
    fn fingerprint_is_not_fooled_by_concatenation() {
        let a = Transaction::new("ab", "c", 1);
        let b = Transaction::new("a", "bc", 1);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn system_transaction_is_valid_unsigned() {
        let provider = Ed25519Provider::new();
        let tx = Transaction::system("bob", 50);
        assert!(tx.is_system());
        assert!(tx.is_valid(&provider));
    }

    #[test]
    fn unsigned_account_transaction_is_invalid() {
        let provider = Ed25519Provider::new();
        let tx = Transaction::new("alice", "bob", 1);
        assert_eq!(tx.verify(&provider), Err(TxError::Unsigned));
    }

    #[test]
    fn signing_with_matching_key_makes_it_valid() {
        let provider = Ed25519Provider::new();
        let (key, addr) = wallet(&provider, 1);
        let mut tx = Transaction::new(addr, "bob", 15);
        tx.sign(&provider, &key).unwrap();
        assert!(tx.is_signed());
        assert!(tx.is_valid(&provider));
    }

    #[test]
    fn signing_with_foreign_key_is_refused() {
        let provider = Ed25519Provider::new();
        let (_, alice) = wallet(&provider, 1);
        let (mallory_key, _) = wallet(&provider, 2);
        let mut tx = Transaction::new(alice, "bob", 15);
        let err = tx.sign(&provider, &mallory_key).unwrap_err();
        assert!(matches!(err, TxError::SenderMismatch { .. }));
        assert!(!tx.is_signed());
        assert!(!tx.is_valid(&provider));
    }

    #[test]
    fn system_transaction_cannot_be_signed() {
        let provider = Ed25519Provider::new();
        let (key, _) = wallet(&provider, 1);
        let mut tx = Transaction::system("bob", 1);
        assert!(tx.sign(&provider, &key).is_err());
        assert!(!tx.is_signed());
    }

    #[test]
    fn tampered_amount_breaks_signature() {
        let provider = Ed25519Provider::new();
        let (key, addr) = wallet(&provider, 1);
        let mut tx = Transaction::new(addr, "bob", 15);
        tx.sign(&provider, &key).unwrap();
        tx.amount = 1_500;
        assert_eq!(tx.verify(&provider), Err(TxError::BadSignature));
    }

    #[test]
    fn signer_key_must_derive_sender() {
        // Mallory signs a claim in Alice's name with her own key.
        let provider = Ed25519Provider::new();
        let (_, alice) = wallet(&provider, 1);
        let (mallory_key, _) = wallet(&provider, 2);
        let mut tx = Transaction::new(alice, "mallory", 100);
        tx.signer_public_key = Some(provider.public_key_of(&mallory_key));
        tx.signature = Some(provider.sign(&mallory_key, &tx.fingerprint()));
        assert_eq!(tx.verify(&provider), Err(TxError::SignerNotSender));
    }

    #[test]
    fn resigning_overwrites_signature() {
        let provider = Ed25519Provider::new();
        let (key, addr) = wallet(&provider, 3);
        let mut tx = Transaction::new(addr, "bob", 5);
        tx.sign(&provider, &key).unwrap();
        tx.amount = 6;
        tx.sign(&provider, &key).unwrap();
        assert!(tx.is_valid(&provider));
    }

    #[test]
    fn involves_sender_and_recipient() {
        let tx = Transaction::new("alice", "bob", 1);
        assert!(tx.involves(&"alice".into()));
        assert!(tx.involves(&"bob".into()));
        assert!(!tx.involves(&"carol".into()));
        assert!(!Transaction::system("bob", 1).involves(&"".into()));
    }

    #[test]
    fn transaction_serialization_example() {
        let tx = Transaction::new("alice", "bob", -3).with_timestamp(1_600_000_000);
        let json = serde_json::to_string(&tx).unwrap();
        let expected = r#"{"timestamp":1600000000,"from":{"account":"alice"},"to":"bob","amount":-3,"signer_public_key":null,"signature":null}"#;
        assert_eq!(json, expected);
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn fractional_amounts_are_not_decoded() {
        let json = r#"{"timestamp":1,"from":"system","to":"bob","amount":1.5564,"signer_public_key":null,"signature":null}"#;
        assert!(serde_json::from_str::<Transaction>(json).is_err());
        let minor_units = json.replace("1.5564", "15564");
        let tx: Transaction = serde_json::from_str(&minor_units).unwrap();
        assert_eq!(tx.amount, 15564);
    }
}
