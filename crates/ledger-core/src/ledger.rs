use crate::{
    consensus::{self, Resolution},
    constants::*,
    error::{LedgerError, Result},
    mine::MiningJob,
    now_millis, pow, seal_hash, serialize_amount, Block, BlockData, Transaction,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Chain plus pending pool, as exchanged between nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSummary {
    #[serde(serialize_with = "serialize_amount")]
    pub address_balance: f64,
    pub address_transactions: Vec<Transaction>,
    /// Each index appears once.
    pub address_block_indexes: Vec<u64>,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TransactionLookup<'a> {
    pub transaction: Option<&'a Transaction>,
    pub block: Option<&'a Block>,
}

/// One node's chain and pending pool. All mutation is local; callers that
/// share a ledger across tasks wrap it in a single lock.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            pending_transactions: Vec::new(),
        };
        ledger.create_genesis();
        ledger
    }

    fn create_genesis(&mut self) {
        self.chain.push(genesis_block());
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.chain.clone(),
            pending_transactions: self.pending_transactions.clone(),
        }
    }

    pub fn last_block(&self) -> Result<&Block> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    /// Appends a block holding the whole pending pool, which is emptied.
    /// Inputs are trusted: the caller has already run the proof-of-work.
    pub fn create_block(&mut self, nonce: u64, previous_block_hash: impl Into<String>, hash: impl Into<String>) -> Block {
        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: now_millis(),
            transactions: std::mem::take(&mut self.pending_transactions),
            nonce,
            hash: hash.into(),
            previous_block_hash: previous_block_hash.into(),
        };
        self.chain.push(block.clone());
        block
    }

    pub fn create_transaction(&self, amount: f64, sender: impl Into<String>, recipient: impl Into<String>) -> Transaction {
        Transaction::new(amount, sender, recipient)
    }

    /// Queues `tx` for the next block and returns that block's index.
    /// Amounts and balances are not checked.
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<u64> {
        let next_index = self.last_block()?.index + 1;
        self.pending_transactions.push(tx);
        Ok(next_index)
    }

    /// Seals the pending pool on the calling thread.
    pub fn mine_block(&mut self) -> Result<Block> {
        let last = self.last_block()?;
        let previous_block_hash = last.hash.clone();
        let data = BlockData {
            transactions: &self.pending_transactions,
            index: last.index + 1,
        };
        let nonce = pow::proof_of_work(&previous_block_hash, &data);
        let hash = seal_hash(&previous_block_hash, &data, nonce);
        let block = self.create_block(nonce, previous_block_hash, hash);
        info!(index = block.index, nonce, hash = %block.hash, "sealed block");
        Ok(block)
    }

    /// Captures the tip and a copy of the pending pool so the proof-of-work
    /// can run without holding the ledger.
    pub fn begin_mining(&self) -> Result<MiningJob> {
        let last = self.last_block()?;
        Ok(MiningJob {
            previous_block_hash: last.hash.clone(),
            index: last.index + 1,
            transactions: self.pending_transactions.clone(),
        })
    }

    /// Appends the block for a finished `MiningJob`. Transactions admitted
    /// while it ran stay pending. Fails with `StaleTip` if the chain moved on
    /// in the meantime, leaving the ledger untouched.
    pub fn commit_mining(&mut self, job: MiningJob, nonce: u64, hash: String) -> Result<Block> {
        let last = self.last_block()?;
        if last.hash != job.previous_block_hash || last.index + 1 != job.index {
            return Err(LedgerError::StaleTip {
                expected: job.previous_block_hash,
            });
        }

        {
            let sealed: HashSet<&str> = job.transactions.iter().map(|tx| tx.transaction_id.as_str()).collect();
            self.pending_transactions
                .retain(|tx| !sealed.contains(tx.transaction_id.as_str()));
        }

        let block = Block {
            index: job.index,
            timestamp: now_millis(),
            transactions: job.transactions,
            nonce,
            hash,
            previous_block_hash: job.previous_block_hash,
        };
        self.chain.push(block.clone());
        Ok(block)
    }

    /// Appends a block announced by a peer if it links to the local tip.
    /// With `verify_pow` the seal hash is recomputed as well.
    pub fn receive_block(&mut self, block: Block, verify_pow: bool) -> Result<()> {
        let last = self.last_block()?;
        if verify_pow {
            consensus::accept_foreign_block_verified(last, &block)?;
        } else {
            consensus::accept_foreign_block(last, &block)?;
        }
        info!(index = block.index, hash = %block.hash, "accepted foreign block");
        self.chain.push(block);
        self.pending_transactions.clear();
        Ok(())
    }

    /// Runs the longest-valid-chain rule against `peers` and applies the
    /// outcome. Returns whether the local chain was replaced.
    pub fn resolve<I>(&mut self, peers: I) -> bool
    where
        I: IntoIterator<Item = ChainSnapshot>,
    {
        let resolution = consensus::resolve(&self.chain, peers);
        self.apply_resolution(resolution)
    }

    /// Applies a `Resolution` computed against an earlier copy of this chain.
    /// A winner that is no longer strictly longer than the current chain is
    /// dropped, since the chain may have grown while it was being validated.
    pub fn apply_resolution(&mut self, resolution: Resolution) -> bool {
        match resolution {
            Resolution::Replaced(winner) if winner.chain.len() > self.chain.len() => {
                info!(
                    old_length = self.chain.len(),
                    new_length = winner.chain.len(),
                    "local chain replaced"
                );
                self.chain = winner.chain;
                self.pending_transactions = winner.pending_transactions;
                true
            }
            Resolution::Replaced(winner) => {
                info!(
                    length = self.chain.len(),
                    candidate_length = winner.chain.len(),
                    "local chain grew past the peer chain"
                );
                false
            }
            Resolution::Unchanged { .. } => false,
        }
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.chain.iter().find(|block| block.hash == hash)
    }

    /// First transaction with `transaction_id`, together with its block.
    pub fn find_transaction(&self, transaction_id: &str) -> TransactionLookup<'_> {
        self.chain
            .iter()
            .find_map(|block| {
                block
                    .transactions
                    .iter()
                    .find(|tx| tx.transaction_id == transaction_id)
                    .map(|tx| TransactionLookup {
                        transaction: Some(tx),
                        block: Some(block),
                    })
            })
            .unwrap_or_default()
    }

    /// Balance is received minus sent over every sealed transaction touching
    /// `address`; pending transactions do not count.
    pub fn address_summary(&self, address: &str) -> AddressSummary {
        let mut balance = 0.0;
        let mut transactions = Vec::new();
        let mut block_indexes = Vec::new();
        let mut seen = HashSet::new();

        for block in &self.chain {
            for tx in &block.transactions {
                if tx.sender != address && tx.recipient != address {
                    continue;
                }
                if tx.recipient == address {
                    balance += tx.amount;
                }
                if tx.sender == address {
                    balance -= tx.amount;
                }
                transactions.push(tx.clone());
                if seen.insert(block.index) {
                    block_indexes.push(block.index);
                }
            }
        }

        AddressSummary {
            address_balance: balance,
            address_transactions: transactions,
            address_block_indexes: block_indexes,
        }
    }
}

/// The fixed first block every valid chain starts with.
pub fn genesis_block() -> Block {
    Block {
        index: GENESIS_INDEX,
        timestamp: GENESIS_TIMESTAMP,
        transactions: vec![],
        nonce: GENESIS_NONCE,
        hash: GENESIS_HASH.to_string(),
        previous_block_hash: GENESIS_PREVIOUS_HASH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: f64, sender: &str, recipient: &str) -> Transaction {
        Transaction::new(amount, sender, recipient)
    }

    #[test]
    fn genesis_block_example() {
        let ledger = Ledger::new();
        assert_eq!(ledger.chain().len(), 1);
        let genesis = ledger.last_block().unwrap();
        assert_eq!(*genesis, genesis_block());
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.nonce, GENESIS_NONCE);
        assert_eq!(genesis.hash, GENESIS_HASH);
        assert_eq!(genesis.previous_block_hash, GENESIS_PREVIOUS_HASH);
        assert!(genesis.transactions.is_empty());
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn every_ledger_starts_from_the_same_genesis() {
        assert_eq!(Ledger::new().chain(), Ledger::new().chain());
    }

    #[test]
    fn create_transaction_does_not_touch_pool() {
        let ledger = Ledger::new();
        let tx = ledger.create_transaction(5.0, "A", "B");
        assert_eq!(tx.amount, 5.0);
        assert_eq!(tx.sender, "A");
        assert_eq!(tx.recipient, "B");
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn admit_transaction_returns_next_block_index() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.admit_transaction(tx(1.0, "A", "B")).unwrap(), 2);
        assert_eq!(ledger.admit_transaction(tx(-3.0, "A", "B")).unwrap(), 2);
        assert_eq!(ledger.pending_transactions().len(), 2);
    }

    #[test]
    fn create_block_drains_pending_pool() {
        let mut ledger = Ledger::new();
        ledger.admit_transaction(tx(1.0, "A", "B")).unwrap();
        let block = ledger.create_block(7, GENESIS_HASH, "0000abc");
        assert_eq!(block.index, 2);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.nonce, 7);
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.last_block().unwrap(), &block);
    }

    #[test]
    fn last_block_on_empty_chain_fails() {
        let ledger = Ledger {
            chain: Vec::new(),
            pending_transactions: Vec::new(),
        };
        assert!(matches!(ledger.last_block(), Err(LedgerError::EmptyChain)));
    }

    #[test]
    fn mine_one_block_scenario() {
        let mut ledger = Ledger::new();
        let genesis_hash = ledger.last_block().unwrap().hash.clone();
        ledger.admit_transaction(tx(12.5, "A", "B")).unwrap();

        let block = ledger.mine_block().unwrap();

        assert_eq!(ledger.chain().len(), 2);
        assert_eq!(block.previous_block_hash, genesis_hash);
        assert!(pow::meets_difficulty(&block.hash));
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.address_summary("B").address_balance, 12.5);
        assert!(consensus::is_valid(ledger.chain()));
    }

    #[test]
    fn block_by_hash_lookup() {
        let mut ledger = Ledger::new();
        let block = ledger.mine_block().unwrap();
        assert_eq!(ledger.block_by_hash(&block.hash), Some(&block));
        assert_eq!(ledger.block_by_hash(GENESIS_HASH).map(|b| b.index), Some(1));
        assert!(ledger.block_by_hash("missing").is_none());
    }

    #[test]
    fn find_transaction_returns_containing_block() {
        let mut ledger = Ledger::new();
        let first = tx(1.0, "A", "B");
        let id = first.transaction_id.clone();
        ledger.admit_transaction(first.clone()).unwrap();
        ledger.mine_block().unwrap();
        ledger.admit_transaction(tx(2.0, "B", "C")).unwrap();
        ledger.mine_block().unwrap();

        let found = ledger.find_transaction(&id);
        assert_eq!(found.transaction, Some(&first));
        assert_eq!(found.block.map(|b| b.index), Some(2));

        let missing = ledger.find_transaction("nope");
        assert!(missing.transaction.is_none());
        assert!(missing.block.is_none());
    }

    #[test]
    fn find_transaction_ignores_pending_pool() {
        let mut ledger = Ledger::new();
        let pending = tx(1.0, "A", "B");
        let id = pending.transaction_id.clone();
        ledger.admit_transaction(pending).unwrap();
        assert!(ledger.find_transaction(&id).transaction.is_none());
    }

    #[test]
    fn address_summary_balance_and_unique_blocks() {
        let mut ledger = Ledger::new();
        ledger.admit_transaction(tx(10.0, "A", "B")).unwrap();
        ledger.admit_transaction(tx(4.0, "B", "C")).unwrap();
        ledger.mine_block().unwrap();
        ledger.admit_transaction(tx(1.5, "C", "B")).unwrap();
        ledger.admit_transaction(tx(3.0, "B", "B")).unwrap();
        ledger.mine_block().unwrap();
        ledger.admit_transaction(tx(99.0, "X", "B")).unwrap();

        let summary = ledger.address_summary("B");
        assert_eq!(summary.address_balance, 10.0 - 4.0 + 1.5);
        assert_eq!(summary.address_transactions.len(), 4);
        assert_eq!(summary.address_block_indexes, vec![2, 3]);

        let unknown = ledger.address_summary("nobody");
        assert_eq!(unknown.address_balance, 0.0);
        assert!(unknown.address_transactions.is_empty());
        assert!(unknown.address_block_indexes.is_empty());
    }

    #[test]
    fn address_summary_serialization() {
        let summary = AddressSummary {
            address_balance: 25.0,
            address_transactions: vec![],
            address_block_indexes: vec![2],
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert_eq!(
            json,
            r#"{"addressBalance":25,"addressTransactions":[],"addressBlockIndexes":[2]}"#
        );
    }

    #[test]
    fn mining_job_keeps_late_transactions_pending() {
        let mut ledger = Ledger::new();
        ledger.admit_transaction(tx(1.0, "A", "B")).unwrap();
        let job = ledger.begin_mining().unwrap();
        let late = tx(2.0, "C", "D");
        ledger.admit_transaction(late.clone()).unwrap();

        let (nonce, hash) = job.mine(POW_DIFFICULTY);
        let block = ledger.commit_mining(job, nonce, hash).unwrap();

        assert_eq!(block.index, 2);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(ledger.pending_transactions(), &[late]);
        assert!(consensus::is_valid(ledger.chain()));
    }

    #[test]
    fn mining_job_on_moved_tip_is_stale() {
        let mut ledger = Ledger::new();
        let job = ledger.begin_mining().unwrap();
        ledger.mine_block().unwrap();

        let (nonce, hash) = job.mine(POW_DIFFICULTY);
        let result = ledger.commit_mining(job, nonce, hash);
        assert!(matches!(result, Err(LedgerError::StaleTip { .. })));
        assert_eq!(ledger.chain().len(), 2);
    }

    #[test]
    fn receive_block_appends_and_clears_pool() {
        let mut source = Ledger::new();
        source.admit_transaction(tx(1.0, "A", "B")).unwrap();
        let block = source.mine_block().unwrap();

        let mut local = Ledger::new();
        local.admit_transaction(tx(5.0, "X", "Y")).unwrap();
        local.receive_block(block.clone(), true).unwrap();
        assert_eq!(local.chain().len(), 2);
        assert_eq!(local.last_block().unwrap(), &block);
        assert!(local.pending_transactions().is_empty());
    }

    #[test]
    fn receive_block_with_wrong_index_changes_nothing() {
        let mut source = Ledger::new();
        let mut block = source.mine_block().unwrap();
        block.index = 3;

        let mut local = Ledger::new();
        local.admit_transaction(tx(5.0, "X", "Y")).unwrap();
        let result = local.receive_block(block, false);
        assert!(matches!(result, Err(LedgerError::RejectedBlock(_))));
        assert_eq!(local.chain().len(), 1);
        assert_eq!(local.pending_transactions().len(), 1);
    }

    #[test]
    fn resolve_adopts_longer_valid_peer_chain() {
        let mut peer = Ledger::new();
        peer.mine_block().unwrap();
        peer.admit_transaction(tx(3.0, "P", "Q")).unwrap();
        let offered = peer.snapshot();

        let mut local = Ledger::new();
        local.admit_transaction(tx(1.0, "L", "M")).unwrap();
        assert!(local.resolve(vec![offered.clone()]));
        assert_eq!(local.snapshot(), offered);

        // Same length again: nothing to do.
        assert!(!local.resolve(vec![offered]));
    }

    #[test]
    fn resolution_computed_off_ledger_is_dropped_once_outgrown() {
        let mut peer = Ledger::new();
        peer.mine_block().unwrap();
        let offered = peer.snapshot();

        let mut local = Ledger::new();
        let resolution = consensus::resolve(local.chain(), vec![offered]);
        assert!(matches!(resolution, Resolution::Replaced(_)));

        // The local chain catches up before the resolution is applied.
        local.mine_block().unwrap();
        let before = local.snapshot();
        assert!(!local.apply_resolution(resolution));
        assert_eq!(local.snapshot(), before);
        assert!(!local.apply_resolution(Resolution::Unchanged { rejected: None }));
    }

    #[test]
    fn mined_chain_stays_valid_after_a_json_round_trip() {
        let mut ledger = Ledger::new();
        ledger.admit_transaction(tx(994.1414234726625, "A", "B")).unwrap();
        ledger.admit_transaction(tx(0.1 + 0.2, "B", "C")).unwrap();
        ledger.mine_block().unwrap();
        assert!(consensus::is_valid(ledger.chain()));

        let wire = serde_json::to_string(&ledger.snapshot()).unwrap();
        let received: ChainSnapshot = serde_json::from_str(&wire).unwrap();
        assert_eq!(received, ledger.snapshot());
        assert_eq!(consensus::validate_chain(&received.chain), Ok(()));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let ledger = Ledger::new();
        let value = serde_json::to_value(ledger.snapshot()).unwrap();
        assert!(value["chain"].is_array());
        assert!(value["pendingTransactions"].is_array());
        let extra = serde_json::json!({
            "chain": value["chain"],
            "pendingTransactions": [],
            "currentNodeUrl": "http://127.0.0.1:3001",
            "networkNodes": []
        });
        let parsed: ChainSnapshot = serde_json::from_value(extra).unwrap();
        assert_eq!(parsed, ledger.snapshot());
    }
}
