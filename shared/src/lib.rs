pub mod address;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use address::{derive_address, derive_address_hex};
pub use crypto::{
    public_key_from_bytes, sign_spend, spend_challenge, verify_spend, KeyPair, PrivateKey,
    PublicKey, Signature, SignatureAlgorithm,
};
pub use error::BlockchainError;
pub use hash::Hash256;
pub use types::{Amount, BlockId, OutputIndex, Timestamp, TxId};

pub type Result<T> = std::result::Result<T, BlockchainError>;
