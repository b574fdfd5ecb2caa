use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Opaque 256-bit content hash used for transactions, blocks and message envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// The all-zeros hash, used as `previous_hash` for the genesis block.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hashes arbitrary bytes with Keccak-256.
    #[must_use]
    pub fn keccak256(data: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Hashes the canonical JSON encoding of any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn of_json<T: Serialize>(value: &T) -> Result<Self, crate::BlockchainError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| crate::BlockchainError::SerializationError(e.to_string()))?;
        Ok(Self::keccak256(&bytes))
    }

    /// Parses a 64-character lowercase hex string into a hash.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid 32-byte hex.
    pub fn from_hex(s: &str) -> Result<Self, crate::BlockchainError> {
        let bytes = hex::decode(s).map_err(|_| crate::BlockchainError::InvalidHash)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| crate::BlockchainError::InvalidHash)?;
        Ok(Self(bytes))
    }

    /// Number of leading `'0'` hex characters in the lowercase hex representation.
    #[must_use]
    pub fn leading_zero_hex_chars(&self) -> u32 {
        self.to_string().chars().take_while(|&c| c == '0').count() as u32
    }

    /// Checks whether this hash is PoW-valid at the given difficulty: its lowercase
    /// hex representation must begin with `difficulty` leading `'0'` characters.
    #[must_use]
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zero_hex_chars() >= difficulty
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<String> for Hash256 {
    type Error = crate::BlockchainError;

    fn try_from(hex_string: String) -> Result<Self, Self::Error> {
        Self::from_hex(&hex_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_displays_as_64_zero_chars() {
        let hash = Hash256::zero();
        assert_eq!(hash.to_string(), "0".repeat(64));
    }

    #[test]
    fn keccak256_of_nonempty_data_is_not_zero() {
        let hash = Hash256::keccak256(b"hello world");
        assert_ne!(hash, Hash256::zero());
    }

    #[test]
    fn difficulty_is_checked_against_hex_characters_not_bits() {
        // A hash whose first byte is 0x0f has one leading zero *hex character*
        // but only four leading zero *bits* - the hex-character rule must win.
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x0f;
        let hash = Hash256::from_bytes(bytes);
        assert!(hash.meets_difficulty(1));
        assert!(!hash.meets_difficulty(2));
    }

    #[test]
    fn leading_zero_hex_chars_counts_full_zero_bytes_and_stops_at_first_nonzero_nibble() {
        let mut bytes = [0u8; 32];
        bytes[3] = 0x01;
        bytes[4] = 0xff;
        let hash = Hash256::from_bytes(bytes);
        // bytes 0..3 are zero (6 hex chars), byte 3 is 0x01 (one more zero nibble)
        assert_eq!(hash.leading_zero_hex_chars(), 7);
    }

    #[test]
    fn roundtrips_through_hex_string() {
        let hash = Hash256::keccak256(b"roundtrip");
        let parsed = Hash256::from_hex(&hash.to_string()).unwrap();
        assert_eq!(hash, parsed);
    }
}
