use crate::script::Script;
use serde::{Deserialize, Serialize};
use shared::BlockchainError;
use std::collections::HashMap;

/// An unspent transaction output, keyed in [`UtxoSet`] by `"{tx_hash}:{output_index}"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub amount: u64,
    pub locking_script: Script,
}

impl Utxo {
    #[must_use]
    pub const fn new(amount: u64, locking_script: Script) -> Self {
        Self {
            amount,
            locking_script,
        }
    }
}

/// The set of all unspent outputs, keyed by `"{tx_hash}:{output_index}"`. This
/// is derived state: it can always be rebuilt by replaying the chain from
/// genesis, and is never itself part of consensus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSet {
    utxos: HashMap<String, Utxo>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            utxos: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: String, utxo: Utxo) {
        self.utxos.insert(key, utxo);
    }

    pub fn remove(&mut self, key: &str) -> Option<Utxo> {
        self.utxos.remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Utxo> {
        self.utxos.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.utxos.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Iterates every `(key, utxo)` pair in the set.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Utxo)> {
        self.utxos.iter()
    }

    /// Total value of every UTXO locked to `locking_script`.
    #[must_use]
    pub fn balance_for_script(&self, locking_script: &Script) -> u64 {
        self.utxos
            .values()
            .filter(|utxo| &utxo.locking_script == locking_script)
            .map(|utxo| utxo.amount)
            .sum()
    }

    /// Greedily selects UTXOs locked to `locking_script` until their combined
    /// value covers `amount`, returning `InsufficientFunds` if it never does.
    ///
    /// # Errors
    ///
    /// Returns `BlockchainError::InsufficientFunds` if the script's total
    /// balance is below `amount`, or `InvalidTransaction` on overflow.
    pub fn select_utxos(
        &self,
        locking_script: &Script,
        amount: u64,
    ) -> Result<Vec<(String, &Utxo)>, BlockchainError> {
        let mut selected = Vec::new();
        let mut total = 0u64;

        for (key, utxo) in &self.utxos {
            if &utxo.locking_script != locking_script {
                continue;
            }
            selected.push((key.clone(), utxo));
            total = total
                .checked_add(utxo.amount)
                .ok_or_else(|| BlockchainError::InvalidTransaction("overflow selecting utxos".to_string()))?;
            if total >= amount {
                return Ok(selected);
            }
        }

        Err(BlockchainError::InsufficientFunds)
    }
}
