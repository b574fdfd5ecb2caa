//! Post-quantum signing primitives (ML-DSA / CRYSTALS-Dilithium).

use crate::{BlockchainError, Hash256, Result};
use pqcrypto_dilithium::dilithium5;
use pqcrypto_traits::sign::{
    PublicKey as PQCPublicKeyTrait, SecretKey as PQCSecretKeyTrait, SignedMessage,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

/// Signature algorithms supported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    MLDSA65,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

/// A generated ML-DSA keypair. An address is derived from the public key via
/// [`crate::derive_address`].
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
    public_key: PublicKey,
    algorithm: SignatureAlgorithm,
    timestamp: i64,
}

impl PublicKey {
    /// # Errors
    ///
    /// Never fails today; returns `Result` so callers can validate key length in the future.
    #[allow(clippy::missing_const_for_fn)]
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            key_data: bytes,
            algorithm: SignatureAlgorithm::MLDSA65,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn to_pqc_public_key(&self) -> Result<dilithium5::PublicKey> {
        dilithium5::PublicKey::from_bytes(&self.key_data)
            .map_err(|_| BlockchainError::InvalidKeySize {
                expected: dilithium5::public_key_bytes(),
                actual: self.key_data.len(),
            })
    }
}

impl PrivateKey {
    /// # Errors
    ///
    /// Never fails today; returns `Result` so callers can validate key length in the future.
    #[allow(clippy::missing_const_for_fn)]
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            key_data: bytes,
            algorithm: SignatureAlgorithm::MLDSA65,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn to_pqc_secret_key(&self) -> Result<dilithium5::SecretKey> {
        dilithium5::SecretKey::from_bytes(&self.key_data)
            .map_err(|_| BlockchainError::InvalidKeySize {
                expected: dilithium5::secret_key_bytes(),
                actual: self.key_data.len(),
            })
    }
}

impl KeyPair {
    /// Generates a fresh ML-DSA-65 keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying key material cannot be wrapped.
    pub fn generate() -> Result<Self> {
        let (public_key_bytes, secret_key_bytes) = dilithium5::keypair();

        let public_key = PublicKey::from_bytes(public_key_bytes.as_bytes().to_vec())?;
        let private_key = PrivateKey::from_bytes(secret_key_bytes.as_bytes().to_vec())?;

        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Signs an arbitrary message, embedding the signer's public key for verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key material is malformed.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let secret_key = self.private_key.to_pqc_secret_key()?;
        let signed_message = dilithium5::sign(message, &secret_key);
        let timestamp = now_ns();

        Ok(Signature {
            data: signed_message.as_bytes().to_vec(),
            public_key: self.public_key.clone(),
            algorithm: SignatureAlgorithm::MLDSA65,
            timestamp,
        })
    }
}

impl Signature {
    /// Verifies this signature against `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded public key is malformed.
    pub fn verify(&self, message: &[u8]) -> Result<bool> {
        let public_key = self.public_key.to_pqc_public_key()?;
        let signed_message =
            SignedMessage::from_bytes(&self.data).map_err(|_| BlockchainError::InvalidSignature)?;

        Ok(dilithium5::open(&signed_message, &public_key)
            .map(|verified_message| verified_message == message)
            .unwrap_or(false))
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.data.len()
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Builds the spend challenge hashed and signed when authorizing a transaction
/// input: `hash("{tx_hash}:{output_index}")`.
#[must_use]
pub fn spend_challenge(tx_hash: &Hash256, output_index: u32) -> Hash256 {
    Hash256::keccak256(format!("{tx_hash}:{output_index}").as_bytes())
}

/// Signs a `(transaction_hash, output_index)` spend challenge with the given keypair.
///
/// # Errors
///
/// Returns an error if signing fails.
pub fn sign_spend(tx_hash: &Hash256, output_index: u32, keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(spend_challenge(tx_hash, output_index).as_bytes())
}

/// Verifies a signature against a `(transaction_hash, output_index)` spend challenge.
///
/// # Errors
///
/// Returns an error if the embedded public key is malformed.
pub fn verify_spend(
    tx_hash: &Hash256,
    output_index: u32,
    signature: &Signature,
) -> Result<bool> {
    signature.verify(spend_challenge(tx_hash, output_index).as_bytes())
}

/// Creates a public key from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are invalid.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ml_dsa_roundtrip_signs_and_verifies() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"chain-node spend authorization";

        let signature = keypair.sign(message).unwrap();
        assert!(signature.verify(message).unwrap());
    }

    #[test]
    fn signature_rejects_tampered_message() {
        let keypair = KeyPair::generate().unwrap();
        let signature = keypair.sign(b"original payload").unwrap();
        assert!(!signature.verify(b"tampered payload").unwrap());
    }

    #[test]
    fn spend_challenge_is_signed_and_verified_end_to_end() {
        let keypair = KeyPair::generate().unwrap();
        let tx_hash = Hash256::keccak256(b"some transaction");

        let signature = sign_spend(&tx_hash, 0, &keypair).unwrap();
        assert!(verify_spend(&tx_hash, 0, &signature).unwrap());
        // A different output index must not verify against the same signature.
        assert!(!verify_spend(&tx_hash, 1, &signature).unwrap());
    }
}
