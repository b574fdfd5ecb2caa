//! Address derivation: `address = hash(public key in its canonical encoding)`.

use crate::{crypto::PublicKey, Hash256};

/// Derives the 256-bit address for a public key.
#[must_use]
pub fn derive_address(public_key: &PublicKey) -> Hash256 {
    Hash256::keccak256(public_key.as_bytes())
}

/// Hex-encoded address, the form exchanged over the wire in `utxos_request`
/// payloads and embedded in locking scripts.
#[must_use]
pub fn derive_address_hex(public_key: &PublicKey) -> String {
    derive_address(public_key).to_string()
}
