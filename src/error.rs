use shared::BlockchainError;
use thiserror::Error;

/// Errors produced by the node's network, mining and wallet layers.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] BlockchainError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("peer address {0} is not in host:port form")]
    InvalidAddress(String),

    #[error("wallet has insufficient balance: needed {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
