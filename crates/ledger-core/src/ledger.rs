use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::block::{verify_all, Block, BlockBuilder, Hash};
use crate::constants::{BLOCK_CAPACITY, DEFAULT_DIFFICULTY, GENESIS_TIMESTAMP_MS};
use crate::crypto::SigningProvider;
use crate::error::{IntegrityError, MineError, TxError};
use crate::pow::StopSignal;
use crate::transaction::{Address, Amount, Sender, Transaction};
use crate::now_millis;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Transactions per block before it is sealed.
    pub capacity: usize,
    /// Leading zero hex digits required of sealed blocks. Zero keeps mining
    /// out of the admission path.
    pub difficulty: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: BLOCK_CAPACITY,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }
}

impl LedgerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("parse ledger config")?;
        if config.capacity == 0 {
            anyhow::bail!("ledger capacity must be at least 1");
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn mines_on_seal(&self) -> bool {
        self.difficulty > 0
    }

    /// Capacity 0 would seal every block empty-handed; ledgers treat it as 1
    /// for both admission and verification.
    fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        self
    }
}

/// Storage backends implement this to persist sealed blocks by height.
/// Lives in `ledger-core` so backends can depend on the core, not the reverse.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, height: u64, block: &Block) -> Result<()>;
    fn get_block(&self, height: u64) -> Result<Option<Block>>;
    /// `None` when nothing has been stored yet.
    fn tip_height(&self) -> Result<Option<u64>>;
    fn tip_hash(&self) -> Result<Option<Hash>>;
    fn load_blocks(&self) -> Result<Vec<Block>>;
}

/// The canonical genesis: fixed timestamp, no transactions, no link.
pub fn genesis_block() -> Block {
    Block::new(GENESIS_TIMESTAMP_MS, Vec::new(), None)
}

/// Append-only chain of sealed blocks plus at most one open block at the tip.
pub struct Ledger<P: SigningProvider> {
    provider: P,
    config: LedgerConfig,
    chain: Vec<Block>,
    open: Option<BlockBuilder>,
    stop: StopSignal,
}

impl<P: SigningProvider> Ledger<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, LedgerConfig::default())
    }

    pub fn with_config(provider: P, config: LedgerConfig) -> Self {
        Self {
            provider,
            config: config.normalized(),
            chain: vec![genesis_block()],
            open: None,
            stop: StopSignal::new(),
        }
    }

    /// Rebuilds a ledger from previously sealed blocks, refusing anything that
    /// fails the integrity check.
    pub fn from_blocks(
        provider: P,
        config: LedgerConfig,
        blocks: Vec<Block>,
    ) -> Result<Self, IntegrityError> {
        let ledger = Self {
            provider,
            config: config.normalized(),
            chain: blocks,
            open: None,
            stop: StopSignal::new(),
        };
        ledger.verify_chain()?;
        Ok(ledger)
    }

    /// Loads the chain from `store`, writing the genesis block first if the
    /// store is empty.
    pub fn load<S: ChainStore>(provider: P, config: LedgerConfig, store: &S) -> Result<Self> {
        if store.tip_height()?.is_none() {
            store.put_block(0, &genesis_block())?;
            info!("seeded empty store with genesis");
        }
        let blocks = store.load_blocks()?;
        Ok(Self::from_blocks(provider, config, blocks)?)
    }

    /// Writes every sealed block the store does not have yet.
    pub fn persist<S: ChainStore>(&self, store: &S) -> Result<usize> {
        let from = match store.tip_height()? {
            Some(height) => height as usize + 1,
            None => 0,
        };
        let mut written = 0;
        for (height, block) in self.chain.iter().enumerate().skip(from) {
            store.put_block(height as u64, block)?;
            written += 1;
        }
        debug!(written, "persisted sealed blocks");
        Ok(written)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Handle that cancels a mine-on-seal run from another thread. A stop
    /// applies to the run in progress, or the next one if none is running;
    /// the ledger resets the signal when that run ends.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Sealed blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Last sealed block.
    pub fn latest_block(&self) -> &Block {
        // Never empty: constructors start from genesis or verify non-emptiness.
        &self.chain[self.chain.len() - 1]
    }

    pub fn open_block(&self) -> Option<&BlockBuilder> {
        self.open.as_ref()
    }

    /// Sealed blocks plus the open one, if any.
    pub fn block_count(&self) -> usize {
        self.chain.len() + usize::from(self.open.is_some())
    }

    /// Admits `tx` into the open block, sealing it once it reaches capacity.
    /// On error the ledger is left exactly as it was.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), TxError> {
        if tx.to.is_empty() || tx.from.address().is_some_and(Address::is_empty) {
            warn!("rejected transaction without sender or recipient");
            return Err(TxError::MissingAddress);
        }
        if let Err(err) = tx.verify(&self.provider) {
            warn!(%err, "rejected invalid transaction");
            return Err(err);
        }

        let tip = self.latest_block().hash();
        let mut builder = self
            .open
            .take()
            .unwrap_or_else(|| BlockBuilder::new(now_millis(), Some(tip)));
        builder.push(tx);
        debug!(
            height = self.chain.len(),
            len = builder.len(),
            "transaction admitted"
        );

        if builder.len() < self.config.capacity {
            self.open = Some(builder);
            return Ok(());
        }
        if let Err(err) = self.finish(&mut builder) {
            builder.pop();
            self.open = (!builder.is_empty()).then_some(builder);
            return Err(err.into());
        }
        self.chain.push(builder.seal());
        info!(
            height = self.chain.len() - 1,
            hash = %hex::encode(self.latest_block().hash()),
            "sealed full block"
        );
        Ok(())
    }

    /// Seals a partially filled open block. Returns the new block's hash, or
    /// `None` when there was nothing open.
    pub fn seal_open_block(&mut self) -> Result<Option<Hash>, MineError> {
        let Some(mut builder) = self.open.take() else {
            return Ok(None);
        };
        if let Err(err) = self.finish(&mut builder) {
            self.open = Some(builder);
            return Err(err);
        }
        let block = builder.seal();
        let hash = block.hash();
        self.chain.push(block);
        info!(height = self.chain.len() - 1, hash = %hex::encode(hash), "sealed open block");
        Ok(Some(hash))
    }

    fn finish(&self, builder: &mut BlockBuilder) -> Result<(), MineError> {
        if !self.config.mines_on_seal() {
            return Ok(());
        }
        let mined = builder.mine(self.config.difficulty, &self.stop);
        self.stop.reset();
        mined
    }

    /// Every transaction in chain order, open block last.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions())
            .chain(self.open.iter().flat_map(|b| b.transactions()))
    }

    /// Credits to `address` minus debits from it, over the whole chain.
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.transactions().fold(0, |balance: Amount, tx| {
            let mut balance = balance;
            if &tx.to == address {
                balance = balance.saturating_add(tx.amount);
            }
            if tx.from.address() == Some(address) {
                balance = balance.saturating_sub(tx.amount);
            }
            balance
        })
    }

    pub fn transactions_of(&self, address: &Address) -> Vec<&Transaction> {
        self.transactions().filter(|tx| tx.involves(address)).collect()
    }

    /// Total issued by the system sentinel.
    pub fn issued_supply(&self) -> Amount {
        self.transactions()
            .filter(|tx| tx.from == Sender::System)
            .fold(0, |acc: Amount, tx| acc.saturating_add(tx.amount))
    }

    pub fn check_integrity(&self) -> bool {
        match self.verify_chain() {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "integrity check failed");
                false
            }
        }
    }

    /// Like [`Ledger::check_integrity`] but reports the first failure found.
    pub fn verify_chain(&self) -> Result<(), IntegrityError> {
        let Some(first) = self.chain.first() else {
            return Err(IntegrityError::Empty);
        };
        if *first != genesis_block() {
            return Err(IntegrityError::GenesisMismatch);
        }

        for index in 1..self.chain.len() {
            let block = &self.chain[index];
            let prev = &self.chain[index - 1];

            block
                .verify_transactions(&self.provider)
                .map_err(|(position, source)| IntegrityError::InvalidTransaction {
                    index,
                    position,
                    source,
                })?;
            if block.len() > self.config.capacity {
                return Err(IntegrityError::OverCapacity {
                    index,
                    len: block.len(),
                    capacity: self.config.capacity,
                });
            }
            let computed = block.compute_hash();
            if computed != block.hash() {
                return Err(IntegrityError::hash_mismatch(index, &block.hash(), &computed));
            }
            if block.previous_hash() != Some(prev.hash()) {
                return Err(IntegrityError::BrokenLink { index });
            }
            if self.config.mines_on_seal() && !block.meets_difficulty(self.config.difficulty) {
                return Err(IntegrityError::InsufficientWork {
                    index,
                    difficulty: self.config.difficulty,
                });
            }
        }

        if let Some(open) = &self.open {
            let index = self.chain.len();
            verify_all(open.transactions(), &self.provider).map_err(|(position, source)| {
                IntegrityError::InvalidTransaction {
                    index,
                    position,
                    source,
                }
            })?;
            if open.previous_hash() != Some(self.latest_block().hash()) {
                return Err(IntegrityError::BrokenLink { index });
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.chain
    }
}
