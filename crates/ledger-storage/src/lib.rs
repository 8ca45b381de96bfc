//! Persistence for sealed blocks. Blocks are stored as bincode of their serde
//! form, which carries every hashed field, so a reloaded chain recomputes the
//! same hashes and can be verified with `Ledger::from_blocks`.

pub mod sled_store;

pub use sled_store::SledStore;
