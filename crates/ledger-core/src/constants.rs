pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Number of leading `'0'` hex characters a sealed block hash must carry.
pub const POW_DIFFICULTY: usize = 4;

pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_NONCE: u64 = 1997;
pub const GENESIS_TIMESTAMP: u64 = 0;
pub const GENESIS_PREVIOUS_HASH: &str = "SemesterSystem";
pub const GENESIS_HASH: &str = "CompetencyBasedEducation";

pub const MINING_REWARD: f64 = 12.5;
pub const REWARD_SENDER: &str = "00";

/// Bytes of randomness behind transaction ids and node addresses.
pub const ID_SIZE: usize = 16;
