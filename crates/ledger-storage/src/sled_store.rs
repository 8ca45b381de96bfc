use anyhow::{bail, Context, Result};
use ledger_core::{Block, ChainStore, Hash};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("open sled at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!(path = %path.display(), "sled store opened");
    Ok(Self { db, blocks })
  }

  /// Drops every stored block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }
}

fn decode_height(bytes: &[u8]) -> Result<u64> {
  let arr: [u8; 8] = bytes.try_into().context("corrupt block height")?;
  Ok(u64::from_be_bytes(arr))
}

fn decode_block(bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).context("decode stored block")
}

impl ChainStore for SledStore {
  fn put_block(&self, height: u64, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(height.to_be_bytes(), bytes)?;

    // tip only moves forward
    if self.tip_height()?.map_or(true, |tip| height >= tip) {
      self.db.insert(KEY_TIP_HEIGHT, &height.to_be_bytes()[..])?;
      self.db.insert(KEY_TIP_HASH, &block.hash()[..])?;
    }

    self.db.flush()?;
    debug!(height, "block stored");
    Ok(())
  }

  fn get_block(&self, height: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(height.to_be_bytes())?
      .map(|ivec| decode_block(&ivec))
      .transpose()
  }

  fn tip_height(&self) -> Result<Option<u64>> {
    self
      .db
      .get(KEY_TIP_HEIGHT)?
      .map(|v| decode_height(&v))
      .transpose()
  }

  fn tip_hash(&self) -> Result<Option<Hash>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| -> Result<Hash> { v.as_ref().try_into().context("corrupt tip hash") })
      .transpose()
  }

  fn load_blocks(&self) -> Result<Vec<Block>> {
    let mut out = Vec::with_capacity(self.blocks.len());
    for (expected, entry) in self.blocks.iter().enumerate() {
      let (key, value) = entry?;
      let height = decode_height(&key)?;
      if height != expected as u64 {
        bail!("missing block at height {expected}, next stored is {height}");
      }
      out.push(decode_block(&value)?);
    }
    debug!(count = out.len(), "blocks loaded");
    Ok(out)
  }
}
