use crate::block::{Block, DEFAULT_DIFFICULTY};
use crate::transaction::Transaction;
use crate::utxo::{Utxo, UtxoSet};
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash256, Result};

/// An ordered, append-only sequence of blocks plus the fixed proof-of-work
/// difficulty new blocks are validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: u32,
}

impl Chain {
    /// Builds a chain starting from a freshly mined genesis block.
    ///
    /// # Errors
    ///
    /// Returns an error if genesis mining fails.
    pub fn new(genesis_reward: u64, genesis_address: &str, difficulty: u32) -> Result<Self> {
        let genesis = Block::genesis(genesis_reward, genesis_address)?;
        Ok(Self {
            blocks: vec![genesis],
            difficulty,
        })
    }

    /// Wraps an existing, pre-validated block list (e.g. received from a peer).
    ///
    /// # Errors
    ///
    /// Returns an error if the block list violates the chain invariants.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: u32) -> Result<Self> {
        let chain = Self { blocks, difficulty };
        chain.validate_structure()?;
        Ok(chain)
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub const fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Length of the chain (number of blocks).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The most recently appended block.
    ///
    /// # Panics
    ///
    /// Never panics: a chain always has at least a genesis block.
    #[must_use]
    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always has a genesis block")
    }

    /// `blocks[0].index == 0`; for `i>0`, `blocks[i].index == blocks[i-1].index + 1`
    /// and `blocks[i].previous_hash == hash(blocks[i-1])`.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated invariant.
    pub fn validate_structure(&self) -> Result<()> {
        let Some(genesis) = self.blocks.first() else {
            return Err(BlockchainError::InvalidBlock("chain has no blocks".to_string()));
        };
        if genesis.index != 0 {
            return Err(BlockchainError::InvalidBlock(
                "genesis block must have index 0".to_string(),
            ));
        }

        for window in self.blocks.windows(2) {
            let [previous, current] = window else { unreachable!() };
            if current.index != previous.index + 1 {
                return Err(BlockchainError::InvalidBlock(
                    "block index is not sequential".to_string(),
                ));
            }
            if current.previous_hash != previous.hash()? {
                return Err(BlockchainError::InvalidBlock(
                    "block does not link to its predecessor's hash".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Validates `block` against this chain's tip (index, link, PoW, temporal
    /// rule, and transaction-level checks) and appends it.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated invariant.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let tip_hash = self.tip().hash()?;
        if block.index != self.tip().index + 1 {
            return Err(BlockchainError::InvalidBlock(
                "block index does not follow the tip".to_string(),
            ));
        }
        if block.previous_hash != tip_hash {
            return Err(BlockchainError::InvalidBlock(
                "block does not reference the current tip".to_string(),
            ));
        }
        block.validate(self.difficulty)?;
        self.blocks.push(block);
        Ok(())
    }

    /// Rebuilds the UTXO index by replaying every block from genesis. This is
    /// the authoritative derivation; incremental updates during acceptance
    /// must always agree with it.
    ///
    /// # Errors
    ///
    /// Returns an error if any transaction in the chain fails to hash.
    pub fn rebuild_utxo_set(&self) -> Result<UtxoSet> {
        let mut utxo_set = UtxoSet::new();
        for block in &self.blocks {
            for tx in &block.transactions {
                let tx_hash = tx.hash()?;
                for (index, output) in tx.outputs.iter().enumerate() {
                    let key = format!("{tx_hash}:{index}");
                    utxo_set.insert(key, Utxo::new(output.amount, output.locking_script.clone()));
                }
                for input in &tx.inputs {
                    utxo_set.remove(&input.outpoint_key());
                }
            }
        }
        Ok(utxo_set)
    }

    /// Total value ever minted through coinbase outputs across the chain.
    #[must_use]
    pub fn total_supply(&self) -> u64 {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.first())
            .filter(|tx| tx.is_coinbase())
            .flat_map(|tx| tx.total_output_value())
            .sum()
    }

    #[must_use]
    pub fn find_block(&self, hash: Hash256) -> Option<&Block> {
        self.blocks.iter().find(|block| block.hash().ok() == Some(hash))
    }
}

/// Validates a loose list of transactions against a UTXO set: every input
/// must reference an existing output and the set must balance.
///
/// # Errors
///
/// Returns the first violated invariant.
pub fn validate_transaction(tx: &Transaction, utxo_set: &UtxoSet) -> Result<()> {
    tx.validate_basic().map_err(BlockchainError::InvalidTransaction)?;
    if !tx.validate_scripts() {
        return Err(BlockchainError::InvalidTransaction(
            "script evaluation failed".to_string(),
        ));
    }
    if tx.is_coinbase() {
        return Ok(());
    }
    for input in &tx.inputs {
        if !utxo_set.contains(&input.outpoint_key()) {
            return Err(BlockchainError::UtxoNotFound);
        }
    }
    let input_value = tx
        .total_input_value(utxo_set)
        .ok_or_else(|| BlockchainError::InvalidTransaction("input value overflow".to_string()))?;
    let output_value = tx
        .total_output_value()
        .ok_or_else(|| BlockchainError::InvalidTransaction("output value overflow".to_string()))?;
    if input_value < output_value {
        return Err(BlockchainError::InsufficientFunds);
    }
    Ok(())
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(50, "genesis", DEFAULT_DIFFICULTY).expect("genesis mining cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxOutput;

    #[test]
    fn genesis_chain_has_height_one_and_valid_structure() {
        let chain = Chain::new(50, "genesis-address", 1).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.validate_structure().is_ok());
    }

    #[test]
    fn rebuild_utxo_set_reflects_genesis_coinbase() {
        let chain = Chain::new(50, "genesis-address", 1).unwrap();
        let utxo_set = chain.rebuild_utxo_set().unwrap();
        assert_eq!(utxo_set.len(), 1);

        let genesis_tx = chain.tip().transactions[0].hash().unwrap();
        assert_eq!(utxo_set.get(&format!("{genesis_tx}:0")).unwrap().amount, 50);
    }

    #[test]
    fn append_rejects_a_block_not_linked_to_the_tip() {
        let mut chain = Chain::new(50, "genesis-address", 1).unwrap();
        let coinbase = Transaction::coinbase(10, "miner");
        let stray = Block::new(1, Hash256::zero(), vec![coinbase], 0, 0);
        assert!(chain.append(stray).is_err());
    }

    #[test]
    fn append_accepts_a_properly_linked_and_mined_block() {
        let mut chain = Chain::new(50, "genesis-address", 1).unwrap();
        let tip_hash = chain.tip().hash().unwrap();
        let coinbase = Transaction::coinbase(10, "miner");
        let timestamp = 1_000_000;
        let mut next = Block::new(1, tip_hash, vec![coinbase], timestamp, timestamp);
        while !next.meets_pow(1).unwrap() {
            next.nonce += 1;
        }

        chain.append(next).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.rebuild_utxo_set().unwrap().len(), 2);
    }

    #[test]
    fn validate_transaction_rejects_unknown_input() {
        let utxo_set = UtxoSet::new();
        let input = crate::transaction::TxInput::new(Hash256::zero(), 0, vec![]);
        let tx = Transaction::with_timestamp(vec![input], vec![TxOutput::new(10, vec![])], 0);
        assert!(validate_transaction(&tx, &utxo_set).is_err());
    }
}
