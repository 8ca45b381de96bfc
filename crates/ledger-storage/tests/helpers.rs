#![allow(dead_code)]

use ledger_core::{address_of, Address, Ed25519Provider, Ledger, Transaction};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let store = SledStore::open(temp_dir.path()).expect("Failed to open SledStore");
    (temp_dir, store)
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// Ledger with a funded sender and `transfers` signed payments to a second wallet.
pub fn populated_ledger(transfers: usize) -> (Ledger<Ed25519Provider>, Address, Address) {
    let provider = Ed25519Provider::new();
    let key = provider.key_pair_from_seed(&[11u8; 32]);
    let alice = address_of(&provider, &key);
    let bob = Address::new("bob-wallet");
    let mut ledger = Ledger::new(provider);
    ledger
        .add_transaction(Transaction::system(alice.clone(), 1_000))
        .expect("system credit");
    for i in 0..transfers {
        let mut tx = Transaction::new(alice.clone(), bob.clone(), i as i64 + 1);
        tx.sign(ledger.provider(), &key).expect("sign");
        ledger.add_transaction(tx).expect("admit");
    }
    (ledger, alice, bob)
}
