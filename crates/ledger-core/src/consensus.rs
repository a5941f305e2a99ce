//! Chain validation, longest-valid-chain resolution and foreign block checks.
//!
//! Everything here is a pure function of in-memory chain data. Peer snapshots
//! are fetched elsewhere and arrive as untrusted input.

use crate::{ledger::genesis_block, ledger::ChainSnapshot, pow::meets_difficulty, seal_hash, Block};
use thiserror::Error;
use tracing::{debug, warn};

/// First invariant a candidate chain breaks.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainViolation {
    #[error("chain has no genesis block")]
    Empty,
    #[error("genesis block differs from the sentinel")]
    GenesisMismatch,
    #[error("block at position {position} has index {found}, expected {expected}")]
    IndexGap { position: usize, expected: u64, found: u64 },
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },
    #[error("block {index} stores a hash that does not match its contents")]
    HashMismatch { index: u64 },
    #[error("block {index} hash does not meet the proof-of-work target")]
    InsufficientWork { index: u64 },
}

/// Why a block offered by a peer was not appended.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BlockRejection {
    #[error("previous hash {found} does not match local tip {expected}")]
    PreviousHashMismatch { expected: String, found: String },
    #[error("index {found} does not follow local tip, expected {expected}")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("hash does not match the block contents")]
    HashMismatch,
    #[error("hash does not meet the proof-of-work target")]
    InsufficientWork,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Local chain and pending pool stay as they are. `rejected` is set when
    /// the longest candidate was discarded as invalid.
    Unchanged { rejected: Option<ChainViolation> },
    /// The local chain and pending pool are swapped for the winner's.
    Replaced(ChainSnapshot),
}

/// Checks the genesis sentinel, then every block's index, linkage and
/// recomputed proof-of-work. Stops at the first violation.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainViolation> {
    let genesis = chain.first().ok_or(ChainViolation::Empty)?;
    if *genesis != genesis_block() {
        return Err(ChainViolation::GenesisMismatch);
    }

    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);

        let expected = previous.index + 1;
        if current.index != expected {
            return Err(ChainViolation::IndexGap {
                position: position + 1,
                expected,
                found: current.index,
            });
        }
        if current.previous_block_hash != previous.hash {
            return Err(ChainViolation::BrokenLink { index: current.index });
        }

        // The stored hash is never trusted on its own.
        let recomputed = seal_hash(&previous.hash, &current.data(), current.nonce);
        if recomputed != current.hash {
            return Err(ChainViolation::HashMismatch { index: current.index });
        }
        if !meets_difficulty(&recomputed) {
            return Err(ChainViolation::InsufficientWork { index: current.index });
        }
    }
    Ok(())
}

pub fn is_valid(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}

/// Longest-valid-chain rule. The first snapshot strictly longer than
/// everything seen before it wins; ties never displace the local chain or an
/// earlier peer. Only the single winner is validated.
pub fn resolve<I>(local_chain: &[Block], peers: I) -> Resolution
where
    I: IntoIterator<Item = ChainSnapshot>,
{
    let mut max_len = local_chain.len();
    let mut winner: Option<ChainSnapshot> = None;

    for snapshot in peers {
        debug!(length = snapshot.chain.len(), max_len, "considering peer chain");
        if snapshot.chain.len() > max_len {
            max_len = snapshot.chain.len();
            winner = Some(snapshot);
        }
    }

    let Some(winner) = winner else {
        return Resolution::Unchanged { rejected: None };
    };

    match validate_chain(&winner.chain) {
        Ok(()) => Resolution::Replaced(winner),
        Err(violation) => {
            warn!(length = winner.chain.len(), %violation, "longest peer chain rejected");
            Resolution::Unchanged {
                rejected: Some(violation),
            }
        }
    }
}

/// Linkage-only check for a block announced by a peer: it must point at the
/// local tip and carry the next index. The peer's hash is taken at its word.
pub fn accept_foreign_block(last_block: &Block, candidate: &Block) -> Result<(), BlockRejection> {
    if candidate.previous_block_hash != last_block.hash {
        return Err(BlockRejection::PreviousHashMismatch {
            expected: last_block.hash.clone(),
            found: candidate.previous_block_hash.clone(),
        });
    }
    let expected = last_block.index + 1;
    if candidate.index != expected {
        return Err(BlockRejection::IndexMismatch {
            expected,
            found: candidate.index,
        });
    }
    Ok(())
}

/// `accept_foreign_block` plus a recomputation of the seal hash and the
/// difficulty prefix.
pub fn accept_foreign_block_verified(last_block: &Block, candidate: &Block) -> Result<(), BlockRejection> {
    accept_foreign_block(last_block, candidate)?;
    let recomputed = seal_hash(&last_block.hash, &candidate.data(), candidate.nonce);
    if recomputed != candidate.hash {
        return Err(BlockRejection::HashMismatch);
    }
    if !meets_difficulty(&recomputed) {
        return Err(BlockRejection::InsufficientWork);
    }
    Ok(())
}
