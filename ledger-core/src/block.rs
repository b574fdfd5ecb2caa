use crate::merkle::MerkleTree;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash256, Result};

/// Default proof-of-work difficulty: the number of leading hex-zero
/// characters a block hash must have.
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// A block: an index, a link to its predecessor, a committed transaction
/// list, and the nonce/timestamp pair a miner produced while searching for
/// a proof-of-work solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: Hash256,
    pub transactions: Vec<Transaction>,
    pub timestamp: i64,
    pub nonce: i64,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        // Equality mirrors the canonical block identity: previous link,
        // content hash, and the nonce/timestamp pair that proved the work.
        self.previous_hash == other.previous_hash
            && self.timestamp == other.timestamp
            && self.nonce == other.nonce
            && self.hash().ok() == other.hash().ok()
    }
}

impl Eq for Block {}

impl Block {
    #[must_use]
    pub const fn new(
        index: u64,
        previous_hash: Hash256,
        transactions: Vec<Transaction>,
        timestamp: i64,
        nonce: i64,
    ) -> Self {
        Self {
            index,
            previous_hash,
            transactions,
            timestamp,
            nonce,
        }
    }

    /// Builds the genesis block: index 0, an all-zero previous hash, a single
    /// coinbase transaction, mined at a low difficulty so tests stay fast.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails during the PoW search.
    pub fn genesis(reward: u64, reward_address: &str) -> Result<Self> {
        let coinbase = Transaction::coinbase(reward, reward_address);
        let timestamp = now_ns();
        let mut block = Self::new(0, Hash256::zero(), vec![coinbase], timestamp, timestamp);

        while !block.meets_pow(1)? {
            block.nonce = block.nonce.saturating_add(1);
        }
        Ok(block)
    }

    /// Merkle root over this block's transaction hashes.
    ///
    /// # Errors
    ///
    /// Returns an error if any transaction fails to hash.
    pub fn merkle_root(&self) -> Result<Hash256> {
        let leaves = self
            .transactions
            .iter()
            .map(Transaction::hash)
            .collect::<Result<Vec<_>>>()?;
        Ok(MerkleTree::build(leaves).root().unwrap_or_else(Hash256::zero))
    }

    /// Hash over the canonical `(index, previous_hash, merkle_root, nonce, timestamp)` tuple.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the merkle root computation fails.
    pub fn hash(&self) -> Result<Hash256> {
        let merkle_root = self.merkle_root()?;
        Hash256::of_json(&(self.index, self.previous_hash, merkle_root, self.nonce, self.timestamp))
    }

    /// A block is PoW-valid at `difficulty` iff its hex hash begins with that
    /// many literal `'0'` characters (a character check, not a bit count).
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails.
    pub fn meets_pow(&self, difficulty: u32) -> Result<bool> {
        Ok(self.hash()?.meets_difficulty(difficulty))
    }

    /// Anti-cheating temporal rule: the nonce (the ns-timestamp captured when
    /// a solution was found) must not precede the block's own timestamp.
    #[must_use]
    pub const fn satisfies_temporal_rule(&self) -> bool {
        self.nonce >= self.timestamp
    }

    /// `true` for the genesis block or any block whose first transaction is a coinbase.
    #[must_use]
    pub fn has_leading_coinbase(&self) -> bool {
        self.transactions.first().is_some_and(Transaction::is_coinbase)
    }

    /// Structural validation: the first transaction is the coinbase; every
    /// transaction individually well-formed; PoW and temporal rule satisfied.
    /// A later transaction may also have empty inputs (e.g. an all-empty
    /// transaction submitted by a wallet) without being rejected as a
    /// duplicate coinbase — nothing in the protocol forbids that shape.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a [`BlockchainError`].
    pub fn validate(&self, difficulty: u32) -> Result<()> {
        if self.transactions.is_empty() || !self.transactions[0].is_coinbase() {
            return Err(BlockchainError::InvalidBlock(
                "block must start with a coinbase transaction".to_string(),
            ));
        }
        for tx in &self.transactions {
            tx.validate_basic()
                .map_err(BlockchainError::InvalidTransaction)?;
            if !tx.validate_scripts() {
                return Err(BlockchainError::InvalidTransaction(
                    "script evaluation failed".to_string(),
                ));
            }
        }
        if !self.meets_pow(difficulty)? {
            return Err(BlockchainError::InsufficientDifficulty);
        }
        if !self.satisfies_temporal_rule() {
            return Err(BlockchainError::InvalidBlock(
                "nonce precedes block timestamp".to_string(),
            ));
        }
        Ok(())
    }
}

fn now_ns() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
