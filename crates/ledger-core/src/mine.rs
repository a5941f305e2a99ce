use crate::{constants::HASH_HEX_SIZE, pow::count_leading_zero_nibbles, seal_digest, BlockData, Transaction};
use rayon::prelude::*;
use tracing::info;

/// Nonces handed to the thread pool per round. Rounds are searched in
/// ascending order so the first hit is also the smallest nonce overall.
const NONCES_PER_ROUND: u64 = 1 << 16;

/// Everything a miner needs, captured from the ledger at the start of a run.
/// The ledger keeps accepting transactions while the job is mined; only the
/// ones captured here end up in the sealed block.
#[derive(Clone, Debug, PartialEq)]
pub struct MiningJob {
    pub previous_block_hash: String,
    pub index: u64,
    pub transactions: Vec<Transaction>,
}

impl MiningJob {
    pub fn data(&self) -> BlockData<'_> {
        BlockData {
            transactions: &self.transactions,
            index: self.index,
        }
    }

    /// Runs the proof-of-work on the rayon pool and returns `(nonce, hash)`.
    pub fn mine(&self, difficulty: usize) -> (u64, String) {
        mine_parallel(&self.previous_block_hash, &self.data(), difficulty)
    }
}

/// Parallel counterpart of `pow::proof_of_work_with_difficulty`. Returns the
/// same (minimal) nonce, together with its hex hash.
///
/// # Panics
/// If `difficulty` exceeds the number of hex digits in a SHA-256 hash.
pub fn mine_parallel(previous_block_hash: &str, data: &BlockData<'_>, difficulty: usize) -> (u64, String) {
    assert!(difficulty <= HASH_HEX_SIZE, "difficulty {difficulty} can never be met");
    let payload = data.canonical_json();
    let prev = previous_block_hash.as_bytes();

    let mut start = 0u64;
    let nonce = loop {
        let end = start.saturating_add(NONCES_PER_ROUND);
        let found = (start..end)
            .into_par_iter()
            .find_first(|nonce| count_leading_zero_nibbles(&seal_digest(prev, *nonce, &payload)) >= difficulty);
        if let Some(nonce) = found {
            break nonce;
        }
        start = end;
    };

    let hash = hex::encode(seal_digest(prev, nonce, &payload));
    info!("Mined block {} with nonce {} and hash {}", data.index, nonce, hash);
    (nonce, hash)
}
