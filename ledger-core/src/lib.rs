pub mod block;
pub mod chain;
pub mod merkle;
pub mod script;
pub mod transaction;
pub mod utxo;

pub use block::{Block, DEFAULT_DIFFICULTY};
pub use chain::{validate_transaction, Chain};
pub use merkle::{verify_proof, MerkleTree};
pub use script::{evaluate_pair, Script};
pub use transaction::{Transaction, TxInput, TxOutput};
pub use utxo::{Utxo, UtxoSet};

pub use shared::{BlockchainError, Hash256, Result};
