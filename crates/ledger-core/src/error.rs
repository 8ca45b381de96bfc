use thiserror::Error;

use crate::block::Hash;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction has an empty sender or recipient address")]
    MissingAddress,
    #[error("key pair derives address {derived}, transaction claims {claimed}")]
    SenderMismatch { derived: String, claimed: String },
    #[error("transaction is not signed")]
    Unsigned,
    #[error("signer public key does not derive the sender address")]
    SignerNotSender,
    #[error("signature does not verify against the transaction fingerprint")]
    BadSignature,
    #[error("sealing the full block failed: {0}")]
    Seal(#[from] MineError),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MineError {
    #[error("mining cancelled before the target was met")]
    Cancelled,
    #[error("difficulty {0} exceeds the hex digits of a 32-byte hash")]
    Unreachable(u32),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block does not match the canonical genesis")]
    GenesisMismatch,
    #[error("block {index} contains an invalid transaction at position {position}: {source}")]
    InvalidTransaction {
        index: usize,
        position: usize,
        source: TxError,
    },
    #[error("block {index} stores hash {stored} but recomputes to {computed}")]
    HashMismatch {
        index: usize,
        stored: String,
        computed: String,
    },
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: usize },
    #[error("block {index} does not satisfy difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: u32 },
    #[error("block {index} holds {len} transactions, capacity is {capacity}")]
    OverCapacity {
        index: usize,
        len: usize,
        capacity: usize,
    },
}

impl IntegrityError {
    pub(crate) fn hash_mismatch(index: usize, stored: &Hash, computed: &Hash) -> Self {
        IntegrityError::HashMismatch {
            index,
            stored: hex::encode(stored),
            computed: hex::encode(computed),
        }
    }
}
