use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::block::{BlockHeader, Hash};
use crate::constants::HASH_HEX_SIZE;
use crate::error::MineError;

/// Cancellation flag shared between a miner and whoever wants to stop it.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// Leading `'0'` characters in the lowercase hex rendering of `hash`.
pub fn leading_zero_hex_digits(hash: &Hash) -> u32 {
    count_leading_zero_bits(hash) / 4
}

pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    leading_zero_hex_digits(hash) >= difficulty
}

fn check_reachable(difficulty: u32) -> Result<(), MineError> {
    if difficulty as usize > HASH_HEX_SIZE {
        return Err(MineError::Unreachable(difficulty));
    }
    Ok(())
}

/// Increments the nonce until the header hash has `difficulty` leading zero
/// hex digits. No iteration cap: `stop` is the only way out besides success.
pub fn mine_header(
    mut header: BlockHeader,
    difficulty: u32,
    stop: &StopSignal,
) -> Result<BlockHeader, MineError> {
    check_reachable(difficulty)?;
    let start = header.nonce;
    loop {
        let hash = header.hash();
        if meets_difficulty(&hash, difficulty) {
            debug!(
                nonce = header.nonce,
                attempts = header.nonce.wrapping_sub(start) + 1,
                hash = %hex::encode(hash),
                "nonce found"
            );
            return Ok(header);
        }
        if stop.is_stopped() {
            info!(
                attempts = header.nonce.wrapping_sub(start) + 1,
                difficulty, "mining cancelled"
            );
            return Err(MineError::Cancelled);
        }
        header.nonce = header.nonce.wrapping_add(1);
    }
}

/// Parallel nonce search over the rayon pool. Any nonce meeting the target
/// wins, so the result is not necessarily the smallest one.
pub fn mine_header_parallel(
    header: BlockHeader,
    difficulty: u32,
    stop: &StopSignal,
) -> Result<BlockHeader, MineError> {
    check_reachable(difficulty)?;
    let found = (header.nonce..u64::MAX).into_par_iter().find_any(|nonce| {
        // A stopped search reports any nonce and is rejected below.
        if stop.is_stopped() {
            return true;
        }
        let mut candidate = header;
        candidate.nonce = *nonce;
        meets_difficulty(&candidate.hash(), difficulty)
    });

    let mut mined = header;
    match found {
        Some(nonce) => {
            mined.nonce = nonce;
            let hash = mined.hash();
            if !meets_difficulty(&hash, difficulty) {
                info!(difficulty, "parallel mining cancelled");
                return Err(MineError::Cancelled);
            }
            info!(nonce, hash = %hex::encode(hash), "mined header in parallel");
            Ok(mined)
        }
        None => Err(MineError::Cancelled),
    }
}
