//! Primitive type aliases shared across the ledger and node crates.

/// 256-bit transaction identifier.
pub type TxId = crate::Hash256;

/// 256-bit block identifier.
pub type BlockId = crate::Hash256;

/// Monetary amount, denominated in the smallest ledger unit.
pub type Amount = u64;

/// Unix timestamp in nanoseconds.
pub type Timestamp = i64;

/// Position of an output within a transaction's output list.
pub type OutputIndex = u32;
