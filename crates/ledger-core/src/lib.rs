//! Minimal single-writer ledger: signed transactions batched into hash-linked
//! blocks, optional proof-of-work sealing and whole-chain integrity checks.

pub mod block;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod pow;
pub mod transaction;

use std::time::{SystemTime, UNIX_EPOCH};

pub use block::{merkle_root, Block, BlockBuilder, BlockHeader, Hash};
pub use crypto::{address_of, derive_address, Ed25519Provider, SigningProvider};
pub use error::{IntegrityError, MineError, TxError};
pub use ledger::{genesis_block, ChainStore, Ledger, LedgerConfig};
pub use pow::StopSignal;
pub use transaction::{Address, Amount, Sender, Transaction};

/// Milliseconds since the Unix epoch; zero if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
