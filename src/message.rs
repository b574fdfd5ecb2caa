//! The gossip envelope and message-type vocabulary spoken between nodes.

use serde::{Deserialize, Serialize};
use shared::Hash256;
use std::time::{SystemTime, UNIX_EPOCH};

/// A node's address on the overlay: `(host, port)`.
pub type PeerId = (String, u16);

/// The kind of payload an envelope carries. Serializes as the lowercase,
/// snake_case names used on the wire (`new_node`, `mined_block`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    NewNode,
    KnownNodes,
    Transaction,
    MinedBlock,
    RequestBlockchain,
    BlockchainUpdate,
    UtxosRequest,
    UtxosResponse,
}

/// A gossip message. `hash` is the single source of truth for deduplication:
/// it is computed over `(message_type, data, sender, sender_name, receiver,
/// sent_at)` so relays can recognize an envelope they have already handled
/// without re-parsing its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub hash: Hash256,
    pub message_type: MessageType,
    pub sender: PeerId,
    pub sender_name: String,
    pub receiver: Option<PeerId>,
    pub sent_at: i64,
    pub data: serde_json::Value,
}

impl Envelope {
    /// Builds an envelope, stamping it with the current time and computing
    /// its dedup hash.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized.
    pub fn new(
        message_type: MessageType,
        data: serde_json::Value,
        sender: PeerId,
        sender_name: String,
        receiver: Option<PeerId>,
    ) -> shared::Result<Self> {
        let sent_at = now_ns();
        let hash = Hash256::of_json(&(message_type, &data, &sender, &sender_name, &receiver, sent_at))?;
        Ok(Self {
            hash,
            message_type,
            sender,
            sender_name,
            receiver,
            sent_at,
            data,
        })
    }

    /// `true` if this envelope is addressed to a specific peer other than the
    /// local node (directed delivery, not broadcast).
    #[must_use]
    pub fn is_directed_elsewhere(&self, local: &PeerId) -> bool {
        self.receiver.as_ref().is_some_and(|receiver| receiver != local)
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
