use crate::script::{self, Script};
use crate::utxo::UtxoSet;
use serde::{Deserialize, Serialize};
use shared::{Hash256, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// An input spending a previously recorded output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub transaction_hash: Hash256,
    pub output_index: u32,
    pub unlocking_script: Script,
}

impl TxInput {
    #[must_use]
    pub const fn new(transaction_hash: Hash256, output_index: u32, unlocking_script: Script) -> Self {
        Self {
            transaction_hash,
            output_index,
            unlocking_script,
        }
    }

    /// The key this input spends in the UTXO set: `"{tx_hash}:{output_index}"`.
    #[must_use]
    pub fn outpoint_key(&self) -> String {
        format!("{}:{}", self.transaction_hash, self.output_index)
    }
}

/// An output carrying an amount and the script that must be satisfied to spend it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub locking_script: Script,
}

impl TxOutput {
    #[must_use]
    pub const fn new(amount: u64, locking_script: Script) -> Self {
        Self {
            amount,
            locking_script,
        }
    }
}

/// A transaction: an ordered list of inputs and outputs plus the nanosecond
/// timestamp of its construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub timestamp: i64,
}

impl Transaction {
    /// Creates a transaction, stamping it with the current time.
    #[must_use]
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            inputs,
            outputs,
            timestamp: now_ns(),
        }
    }

    /// Creates a transaction with an explicit timestamp (used by tests and by
    /// reconstruction from the wire).
    #[must_use]
    pub const fn with_timestamp(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, timestamp: i64) -> Self {
        Self {
            inputs,
            outputs,
            timestamp,
        }
    }

    /// Builds a coinbase transaction: no inputs, one output paying `reward` to
    /// `reward_address`.
    #[must_use]
    pub fn coinbase(reward: u64, reward_address: &str) -> Self {
        let output = TxOutput::new(reward, vec![reward_address.to_string(), "OP_EQUAL".to_string()]);
        Self::new(vec![], vec![output])
    }

    /// A coinbase transaction has no inputs.
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Hash of the canonical `(inputs, outputs, timestamp)` tuple. This is the
    /// transaction's identity: two transactions are equal iff this hash matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be serialized.
    pub fn hash(&self) -> Result<Hash256> {
        Hash256::of_json(&(&self.inputs, &self.outputs, self.timestamp))
    }

    /// Runs the script evaluator over `(inputs[i], outputs[i])` pairs of this
    /// SAME transaction — not against the UTXO set's previous outputs. This is
    /// the spec's pairing rule: script execution is structural only, ownership
    /// is enforced by wallets constructing valid signatures off-chain.
    #[must_use]
    pub fn validate_scripts(&self) -> bool {
        if self.is_coinbase() {
            return true;
        }
        self.inputs
            .iter()
            .zip(self.outputs.iter())
            .all(|(input, output)| script::evaluate_pair(&input.unlocking_script, &output.locking_script))
    }

    /// Basic structural validation: no overflow summing output values. Empty
    /// inputs/outputs and zero-value outputs are not rejected here — `execute`
    /// in the original is a no-op over an empty zip, and §4.2 has no such
    /// precondition.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated invariant.
    pub fn validate_basic(&self) -> std::result::Result<(), String> {
        self.total_output_value()
            .ok_or_else(|| "output value overflow".to_string())?;
        Ok(())
    }

    #[must_use]
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.amount))
    }

    /// Sums the amounts of the UTXOs referenced by this transaction's inputs.
    #[must_use]
    pub fn total_input_value(&self, utxo_set: &UtxoSet) -> Option<u64> {
        self.inputs.iter().try_fold(0u64, |total, input| {
            let utxo = utxo_set.get(&input.outpoint_key())?;
            total.checked_add(utxo.amount)
        })
    }

    /// `total_input_value - total_output_value`, or `0` for a coinbase transaction.
    #[must_use]
    pub fn fee(&self, utxo_set: &UtxoSet) -> Option<u64> {
        if self.is_coinbase() {
            return Some(0);
        }
        let input_value = self.total_input_value(utxo_set)?;
        let output_value = self.total_output_value()?;
        input_value.checked_sub(output_value)
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::{Utxo, UtxoSet};

    #[test]
    fn coinbase_has_no_inputs_and_one_output() {
        let coinbase = Transaction::coinbase(50, "addr-1");
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.outputs.len(), 1);
        assert_eq!(coinbase.outputs[0].amount, 50);
    }

    #[test]
    fn hash_is_deterministic_and_depends_on_timestamp() {
        let tx = Transaction::with_timestamp(vec![], vec![TxOutput::new(10, vec![])], 1234);
        let a = tx.hash().unwrap();
        let b = tx.hash().unwrap();
        assert_eq!(a, b);

        let other = Transaction::with_timestamp(vec![], vec![TxOutput::new(10, vec![])], 5678);
        assert_ne!(a, other.hash().unwrap());
    }

    #[test]
    fn validate_basic_accepts_an_all_empty_transaction() {
        // execute() on the original is a no-op over an empty zip: an
        // all-empty transaction is structurally valid, not rejected.
        let tx = Transaction::with_timestamp(vec![], vec![], 0);
        assert!(tx.validate_basic().is_ok());
    }

    #[test]
    fn validate_basic_accepts_a_zero_value_output() {
        let tx = Transaction::with_timestamp(vec![], vec![TxOutput::new(0, vec![])], 0);
        assert!(tx.validate_basic().is_ok());
    }

    #[test]
    fn scripts_pair_inputs_and_outputs_of_the_same_transaction() {
        // Spend script proves knowledge of "secret" against a same-transaction
        // output locking script, NOT against the referenced previous output -
        // this preserves the spec's documented open question.
        let input = TxInput::new(
            Hash256::zero(),
            0,
            vec!["secret".to_string()],
        );
        let output = TxOutput::new(10, vec!["secret".to_string(), "OP_EQUALVERIFY".to_string()]);
        let tx = Transaction::with_timestamp(vec![input], vec![output], 0);
        assert!(tx.validate_scripts());
    }

    #[test]
    fn fee_is_input_value_minus_output_value() {
        let mut utxo_set = UtxoSet::new();
        let prior_tx_hash = Hash256::keccak256(b"prior");
        utxo_set.insert(
            format!("{prior_tx_hash}:0"),
            Utxo::new(1_000, vec![]),
        );

        let input = TxInput::new(prior_tx_hash, 0, vec![]);
        let output = TxOutput::new(900, vec![]);
        let tx = Transaction::with_timestamp(vec![input], vec![output], 0);

        assert_eq!(tx.fee(&utxo_set), Some(100));
    }

    #[test]
    fn coinbase_pays_zero_fee() {
        let coinbase = Transaction::coinbase(50, "addr-1");
        let utxo_set = UtxoSet::new();
        assert_eq!(coinbase.fee(&utxo_set), Some(0));
    }
}
