use crate::consensus::BlockRejection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("chain has no blocks")]
    EmptyChain,
    #[error("block rejected: {0}")]
    RejectedBlock(#[from] BlockRejection),
    #[error("chain tip moved away from {expected} while mining")]
    StaleTip { expected: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
