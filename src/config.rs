//! Node- and miner-level configuration, built from CLI arguments.

use crate::message::PeerId;

/// Configuration shared by every role (relay, miner, wallet): how the local
/// overlay listener identifies and exposes itself.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub node_name: String,
    pub max_listens: usize,
    pub max_recv_size: usize,
    pub logging_level: tracing::Level,
    pub known_nodes: Vec<PeerId>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            node_name: "node".to_string(),
            max_listens: 128,
            max_recv_size: 16 * 1024 * 1024,
            logging_level: tracing::Level::INFO,
            known_nodes: Vec::new(),
        }
    }
}

impl NodeConfig {
    #[must_use]
    pub fn local_id(&self) -> PeerId {
        (self.host.clone(), self.port)
    }
}

/// Mining-specific parameters layered on top of [`NodeConfig`].
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub difficulty: u32,
    pub block_min_transactions: usize,
    pub reward: u64,
    pub reward_address: String,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: ledger_core::DEFAULT_DIFFICULTY,
            block_min_transactions: 1,
            reward: 50,
            reward_address: "miner".to_string(),
        }
    }
}
