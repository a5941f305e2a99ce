use serde::{ser::Error as _, Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod consensus;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod mine;

pub use consensus::{BlockRejection, ChainViolation, Resolution};
pub use error::{LedgerError, Result};
pub use ledger::{genesis_block, AddressSummary, ChainSnapshot, Ledger, TransactionLookup};
pub use mine::MiningJob;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: f64,
    pub sender: String,
    pub recipient: String,
}

impl Transaction {
    /// Builds a transaction with a fresh 128-bit random id. Amounts and
    /// addresses are taken as given.
    pub fn new(amount: f64, sender: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            transaction_id: random_id(),
            amount,
            sender: sender.into(),
            recipient: recipient.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: String,
    pub previous_block_hash: String,
}

impl Block {
    /// The part of the block covered by the proof-of-work.
    pub fn data(&self) -> BlockData<'_> {
        BlockData {
            transactions: &self.transactions,
            index: self.index,
        }
    }
}

/// Hashed payload of a block. Field order is part of the wire format:
/// peers must serialize `{"transactions":[..],"index":n}` byte for byte.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BlockData<'a> {
    pub transactions: &'a [Transaction],
    pub index: u64,
}

impl BlockData<'_> {
    pub fn canonical_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("block payload is always representable as JSON")
    }
}

/// Amounts are written as JavaScript's `JSON.stringify` would write them so
/// the payload, and with it the seal hash, matches a JavaScript peer.
pub(crate) fn serialize_amount<S: Serializer>(amount: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let raw = RawValue::from_string(js_number(*amount)).map_err(S::Error::custom)?;
    raw.serialize(serializer)
}

/// ECMAScript `Number::toString` of `value`: shortest round-trip digits,
/// plain decimal notation for `1e-7 <= |value| < 1e21`, exponent notation
/// otherwise. Non-finite values become `null` as in `JSON.stringify`.
pub fn js_number(value: f64) -> String {
    if !value.is_finite() {
        return "null".to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exponent.parse::<i32>().unwrap_or(0) + 1;

    let mut out = String::with_capacity(k as usize + 24);
    if value < 0.0 {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        out.push_str(int);
        out.push('.');
        out.push_str(frac);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take(-n as usize));
        out.push_str(&digits);
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        out.push('e');
        out.push(if n > 0 { '+' } else { '-' });
        out.push_str(&(n - 1).abs().to_string());
    }
    out
}

/// SHA-256 over `previous_block_hash || nonce (decimal) || canonical_json(data)`,
/// lowercase hex encoded.
pub fn seal_hash(previous_block_hash: &str, data: &BlockData<'_>, nonce: u64) -> String {
    hex::encode(seal_digest(previous_block_hash.as_bytes(), nonce, &data.canonical_json()))
}

pub(crate) fn seal_digest(previous_block_hash: &[u8], nonce: u64, payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(previous_block_hash);
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(payload);
    hasher.finalize().into()
}

/// Lowercase hex of `constants::ID_SIZE` random bytes.
pub fn random_id() -> String {
    hex::encode(rand::random::<[u8; constants::ID_SIZE]>())
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub mod pow {
    use super::{seal_digest, BlockData};
    use crate::constants::{HASH_HEX_SIZE, POW_DIFFICULTY};

    /// Smallest nonce whose seal hash starts with `POW_DIFFICULTY` zero hex digits.
    pub fn proof_of_work(previous_block_hash: &str, data: &BlockData<'_>) -> u64 {
        proof_of_work_with_difficulty(previous_block_hash, data, POW_DIFFICULTY)
    }

    /// Counts nonces up from zero until the seal hash has at least `difficulty`
    /// leading zero hex digits. Blocks the calling thread until found.
    ///
    /// # Panics
    /// If `difficulty` exceeds the number of hex digits in a SHA-256 hash.
    pub fn proof_of_work_with_difficulty(previous_block_hash: &str, data: &BlockData<'_>, difficulty: usize) -> u64 {
        assert!(difficulty <= HASH_HEX_SIZE, "difficulty {difficulty} can never be met");
        let payload = data.canonical_json();
        let mut nonce = 0u64;
        loop {
            let hash = seal_digest(previous_block_hash.as_bytes(), nonce, &payload);
            if count_leading_zero_nibbles(&hash) >= difficulty {
                return nonce;
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Equivalent to the number of leading `'0'` characters in the hex form.
    pub fn count_leading_zero_nibbles(hash: &[u8]) -> usize {
        let mut total = 0usize;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn meets_difficulty(hash: &str) -> bool {
        hash.len() >= POW_DIFFICULTY && hash.bytes().take(POW_DIFFICULTY).all(|c| c == b'0')
    }
}
