use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::SigningProvider;
use crate::error::{MineError, TxError};
use crate::pow::{self, StopSignal};
use crate::transaction::Transaction;

pub type Hash = [u8; 32];

pub fn sha256(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

/// Order-preserving commitment to a transaction list. Leaves are the hashes of
/// each transaction's canonical encoding; odd levels duplicate the last node,
/// so the tree root is bound to the transaction count to keep `[a, b, c]` and
/// `[a, b, c, c]` apart.
pub fn merkle_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = txs.iter().map(|t| sha256(&t.canonical_bytes())).collect();

    while level.len() > 1 {
        let mut next: Vec<Hash> = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], pair[0])
            };
            let mut hasher = Sha256::new();
            hasher.update(a);
            hasher.update(b);
            next.push(hasher.finalize().into());
        }
        level = next;
    }

    let mut hasher = Sha256::new();
    hasher.update((txs.len() as u64).to_le_bytes());
    hasher.update(level[0]);
    hasher.finalize().into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous_hash: Option<Hash>,
    pub timestamp: u64,
    pub merkle_root: Hash,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 32 + 8 + 32 + 8);
        match &self.previous_hash {
            Some(prev) => {
                bytes.push(1);
                bytes.extend_from_slice(prev);
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.merkle_root);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        sha256(&self.hash_bytes())
    }
}

/// A block still accepting transactions. Sealing consumes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockBuilder {
    previous_hash: Option<Hash>,
    timestamp: u64,
    txs: Vec<Transaction>,
    nonce: u64,
}

impl BlockBuilder {
    pub fn new(timestamp: u64, previous_hash: Option<Hash>) -> Self {
        Self::with_transactions(timestamp, Vec::new(), previous_hash)
    }

    pub fn with_transactions(
        timestamp: u64,
        txs: Vec<Transaction>,
        previous_hash: Option<Hash>,
    ) -> Self {
        Self {
            previous_hash,
            timestamp,
            txs,
            nonce: 0,
        }
    }

    pub fn push(&mut self, tx: Transaction) {
        self.txs.push(tx);
    }

    pub(crate) fn pop(&mut self) -> Option<Transaction> {
        self.txs.pop()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn previous_hash(&self) -> Option<Hash> {
        self.previous_hash
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            merkle_root: merkle_root(&self.txs),
            nonce: self.nonce,
        }
    }

    /// Hash the block would have if sealed right now.
    pub fn preview_hash(&self) -> Hash {
        self.header().hash()
    }

    /// Searches nonces until the hash has `difficulty` leading zero hex digits.
    /// Checks `stop` on every attempt; on cancellation the builder stays open.
    pub fn mine(&mut self, difficulty: u32, stop: &StopSignal) -> Result<(), MineError> {
        let mined = pow::mine_header(self.header(), difficulty, stop)?;
        self.nonce = mined.nonce;
        Ok(())
    }

    /// Like [`BlockBuilder::mine`] but spreads the nonce search over the rayon pool.
    pub fn mine_parallel(&mut self, difficulty: u32, stop: &StopSignal) -> Result<(), MineError> {
        let mined = pow::mine_header_parallel(self.header(), difficulty, stop)?;
        self.nonce = mined.nonce;
        Ok(())
    }

    /// Computes the hash once and freezes the block.
    pub fn seal(self) -> Block {
        let header = self.header();
        Block {
            hash: header.hash(),
            header,
            txs: self.txs,
        }
    }
}

/// A sealed block. Nothing in the public API can change it after sealing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    txs: Vec<Transaction>,
    hash: Hash,
}

impl Block {
    /// Seals `txs` straight away, without mining.
    pub fn new(timestamp: u64, txs: Vec<Transaction>, previous_hash: Option<Hash>) -> Self {
        BlockBuilder::with_transactions(timestamp, txs, previous_hash).seal()
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn previous_hash(&self) -> Option<Hash> {
        self.header.previous_hash
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.header.nonce
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Fresh hash from the current fields, merkle root included. Differs from
    /// [`Block::hash`] only if the block was altered after sealing.
    pub fn compute_hash(&self) -> Hash {
        BlockHeader {
            merkle_root: merkle_root(&self.txs),
            ..self.header
        }
        .hash()
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        pow::meets_difficulty(&self.hash, difficulty)
    }

    /// First invalid transaction, with its position.
    pub fn verify_transactions<P: SigningProvider>(
        &self,
        provider: &P,
    ) -> Result<(), (usize, TxError)> {
        verify_all(&self.txs, provider)
    }

    /// True iff every transaction is valid. Hash and work are not checked here.
    pub fn is_valid<P: SigningProvider>(&self, provider: &P) -> bool {
        self.verify_transactions(provider).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.txs
    }

    #[cfg(test)]
    pub(crate) fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }
}

pub(crate) fn verify_all<P: SigningProvider>(
    txs: &[Transaction],
    provider: &P,
) -> Result<(), (usize, TxError)> {
    txs.iter()
        .enumerate()
        .try_for_each(|(i, tx)| tx.verify(provider).map_err(|e| (i, e)))
}
