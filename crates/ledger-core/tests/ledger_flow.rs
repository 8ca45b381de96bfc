use ledger_core::{
    address_of, genesis_block, Address, Block, Ed25519Provider, IntegrityError, Ledger,
    LedgerConfig, SigningProvider, StopSignal, Transaction, TxError,
};

fn signed(provider: &Ed25519Provider, seed: u8, to: &str, amount: i64) -> Transaction {
    let key = provider.key_pair_from_seed(&[seed; 32]);
    let mut tx = Transaction::new(address_of(provider, &key), to, amount);
    tx.sign(provider, &key).expect("key derives sender");
    tx
}

#[test]
fn signature_binding_end_to_end() {
    let provider = Ed25519Provider::new();
    let owner = provider.generate_key_pair();
    let other = provider.generate_key_pair();
    let mut tx = Transaction::new(address_of(&provider, &owner), "bob", 7);

    assert!(matches!(
        tx.sign(&provider, &other),
        Err(TxError::SenderMismatch { .. })
    ));
    assert!(!tx.is_valid(&provider));

    tx.sign(&provider, &owner).unwrap();
    assert!(tx.is_valid(&provider));

    tx.amount = 8;
    assert!(!tx.is_valid(&provider));
}

#[test]
fn capacity_law_and_links() {
    let mut ledger = Ledger::new(Ed25519Provider::new());
    for i in 0..25 {
        let tx = signed(ledger.provider(), 1, "bob", i);
        ledger.add_transaction(tx).unwrap();
    }
    assert_eq!(ledger.block_count(), 4);
    ledger.seal_open_block().unwrap();

    let blocks = ledger.blocks();
    let sizes: Vec<usize> = blocks.iter().map(Block::len).collect();
    assert_eq!(sizes, vec![0, 10, 10, 5]);
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].previous_hash(), Some(pair[0].hash()));
    }
    assert_eq!(blocks[0], genesis_block());
    assert!(ledger.check_integrity());
}

#[test]
fn tampering_through_serialization_is_caught() {
    let mut ledger = Ledger::new(Ed25519Provider::new());
    ledger.add_transaction(Transaction::system("bob", 10)).unwrap();
    for _ in 0..14 {
        let tx = signed(ledger.provider(), 2, "carol", 3);
        ledger.add_transaction(tx).unwrap();
    }
    ledger.seal_open_block().unwrap();
    let blocks = ledger.blocks().to_vec();

    // Amount edited in the second sealed block
    let mut amount_edit = serde_json::to_value(&blocks).unwrap();
    amount_edit[2]["txs"][0]["amount"] = serde_json::json!(-1);
    let forged: Vec<Block> = serde_json::from_value(amount_edit).unwrap();
    assert!(Ledger::from_blocks(Ed25519Provider::new(), LedgerConfig::default(), forged).is_err());

    // Second block pointed at genesis instead of its predecessor
    let mut relinked = blocks.clone();
    relinked[2] = Block::new(
        relinked[2].timestamp(),
        relinked[2].transactions().to_vec(),
        Some(relinked[0].hash()),
    );
    assert_eq!(
        Ledger::from_blocks(Ed25519Provider::new(), LedgerConfig::default(), relinked).err(),
        Some(IntegrityError::BrokenLink { index: 2 })
    );

    assert!(Ledger::from_blocks(Ed25519Provider::new(), LedgerConfig::default(), blocks).is_ok());
}

#[test]
fn repeated_trailing_transaction_is_caught() {
    let mut ledger = Ledger::new(Ed25519Provider::new());
    for _ in 0..3 {
        ledger.add_transaction(Transaction::system("bob", 10)).unwrap();
    }
    ledger.seal_open_block().unwrap();
    let bob = Address::new("bob");
    assert_eq!(ledger.balance_of(&bob), 30);

    let mut padded = serde_json::to_value(ledger.blocks()).unwrap();
    let last = padded[1]["txs"][2].clone();
    padded[1]["txs"].as_array_mut().unwrap().push(last);
    let forged: Vec<Block> = serde_json::from_value(padded).unwrap();
    assert_eq!(forged[1].len(), 4);

    let stored = forged[1].hash();
    let computed = forged[1].compute_hash();
    assert_ne!(stored, computed);
    assert_eq!(
        Ledger::from_blocks(Ed25519Provider::new(), LedgerConfig::default(), forged).err(),
        Some(IntegrityError::HashMismatch {
            index: 1,
            stored: hex::encode(stored),
            computed: hex::encode(computed),
        })
    );
    assert_eq!(ledger.balance_of(&bob), 30);
}

#[test]
fn forged_signer_key_is_rejected_on_admission() {
    let provider = Ed25519Provider::new();
    let victim = provider.key_pair_from_seed(&[3u8; 32]);
    let attacker = provider.key_pair_from_seed(&[4u8; 32]);
    let mut ledger = Ledger::new(provider);

    let mut tx = Transaction::new(address_of(ledger.provider(), &victim), "attacker", 500);
    tx.signer_public_key = Some(ledger.provider().public_key_of(&attacker));
    tx.signature = Some(ledger.provider().sign(&attacker, &tx.fingerprint()));
    assert_eq!(ledger.add_transaction(tx), Err(TxError::SignerNotSender));
}

#[test]
fn mined_ledger_blocks_carry_work() {
    let config = LedgerConfig {
        capacity: 3,
        difficulty: 1,
    };
    let mut ledger = Ledger::with_config(Ed25519Provider::new(), config);
    for _ in 0..7 {
        ledger.add_transaction(Transaction::system("dave", 2)).unwrap();
    }
    ledger.seal_open_block().unwrap();
    assert_eq!(ledger.blocks().len(), 4);
    for block in &ledger.blocks()[1..] {
        assert!(hex::encode(block.hash()).starts_with('0'));
    }
    assert!(ledger.check_integrity());
    assert_eq!(ledger.balance_of(&Address::new("dave")), 14);
}

#[test]
fn stop_signal_is_shared_with_ledger() {
    let ledger = Ledger::new(Ed25519Provider::new());
    let stop: StopSignal = ledger.stop_signal();
    stop.stop();
    assert!(ledger.stop_signal().is_stopped());
}
