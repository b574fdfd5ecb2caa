//! The mining worker and the block-acceptance / fork-resolution state machine.

use crate::config::MinerConfig;
use crate::error::NodeResult;
use crate::message::{Envelope, MessageType};
use crate::overlay::{MessageHandler, Overlay};
use ledger_core::{chain, Block, Chain, Transaction, Utxo, UtxoSet};
use shared::Hash256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

struct MinerState {
    chain: Chain,
    utxo_set: UtxoSet,
    mempool: Vec<Transaction>,
}

/// Runs a dedicated mining worker over a chain/mempool pair, and implements
/// the peer-driven block-acceptance state machine.
pub struct Miner {
    config: MinerConfig,
    state: Mutex<MinerState>,
    stop_mining: AtomicBool,
    overlay: Mutex<Option<Arc<Overlay>>>,
}

impl Miner {
    /// # Errors
    ///
    /// Returns an error if the UTXO set cannot be rebuilt from `chain`.
    pub fn new(config: MinerConfig, chain: Chain) -> NodeResult<Arc<Self>> {
        let utxo_set = chain.rebuild_utxo_set()?;
        Ok(Arc::new(Self {
            config,
            state: Mutex::new(MinerState {
                chain,
                utxo_set,
                mempool: Vec::new(),
            }),
            stop_mining: AtomicBool::new(false),
            overlay: Mutex::new(None),
        }))
    }

    pub fn attach_overlay(&self, overlay: Arc<Overlay>) {
        *self.overlay.lock().unwrap() = Some(overlay);
    }

    #[must_use]
    pub fn chain_height(&self) -> u64 {
        self.state.lock().unwrap().chain.len()
    }

    #[must_use]
    pub fn mempool_len(&self) -> usize {
        self.state.lock().unwrap().mempool.len()
    }

    /// Validates and adds a transaction to the mempool. Returns `false` (and
    /// drops the transaction) if it fails validation against the current UTXO set.
    pub fn submit_transaction(&self, tx: Transaction) -> bool {
        let mut state = self.state.lock().unwrap();
        if chain::validate_transaction(&tx, &state.utxo_set).is_err() {
            return false;
        }
        state.mempool.push(tx);
        true
    }

    /// Spawns the mining loop on its own thread, per the worker algorithm:
    /// sleep while idle, snapshot the tip, assemble a coinbase-led candidate,
    /// and repeatedly stamp `nonce = now_ns()` until it satisfies the fixed
    /// difficulty, the worker is told to stop, or the candidate goes stale.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self: Arc<Self>) {
        loop {
            if self.stop_mining.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
                continue;
            }

            let Some((previous_hash, index, candidate_txs)) = self.snapshot_candidate() else {
                thread::sleep(Duration::from_millis(50));
                continue;
            };

            let coinbase = Transaction::coinbase(self.config.reward, &self.config.reward_address);
            let mut transactions = vec![coinbase];
            transactions.extend(candidate_txs.clone());
            let timestamp = now_ns();
            let mut block = Block::new(index, previous_hash, transactions, timestamp, timestamp);

            let found = loop {
                if self.stop_mining.load(Ordering::SeqCst) {
                    break false;
                }
                if self.candidate_is_stale(&candidate_txs) {
                    break false;
                }
                block.nonce = now_ns();
                match block.meets_pow(self.config.difficulty) {
                    Ok(true) => break true,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(error = %err, "failed to hash mining candidate");
                        break false;
                    }
                }
            };

            if found {
                self.accept_own_block(block, &candidate_txs);
            }
        }
    }

    fn snapshot_candidate(&self) -> Option<(Hash256, u64, Vec<Transaction>)> {
        let state = self.state.lock().unwrap();
        if state.mempool.len() < self.config.block_min_transactions {
            return None;
        }
        let tip_hash = state.chain.tip().hash().ok()?;
        Some((tip_hash, state.chain.len(), state.mempool.clone()))
    }

    fn candidate_is_stale(&self, candidate_txs: &[Transaction]) -> bool {
        let state = self.state.lock().unwrap();
        !candidate_txs.iter().all(|tx| state.mempool.contains(tx))
    }

    fn accept_own_block(&self, block: Block, included: &[Transaction]) {
        let mut state = self.state.lock().unwrap();
        if state.chain.append(block.clone()).is_err() {
            return;
        }
        if let Ok(utxo_set) = state.chain.rebuild_utxo_set() {
            state.utxo_set = utxo_set;
        }
        state.mempool.retain(|tx| !included.contains(tx));
        drop(state);

        info!(index = block.index, "mined new block");
        if let Some(overlay) = self.overlay.lock().unwrap().as_ref() {
            if let Ok(data) = serde_json::to_value(&block) {
                let _ = overlay.originate(MessageType::MinedBlock, data, None);
            }
        }
    }

    fn handle_transaction(&self, envelope: &Envelope) {
        let Ok(tx) = serde_json::from_value::<Transaction>(envelope.data.clone()) else {
            warn!("transaction envelope carried an unparsable payload");
            return;
        };
        if self.submit_transaction(tx) {
            debug!("accepted transaction into mempool");
        }
    }

    fn handle_mined_block(&self, overlay: &Arc<Overlay>, envelope: &Envelope) {
        let Ok(block) = serde_json::from_value::<Block>(envelope.data.clone()) else {
            warn!("mined_block envelope carried an unparsable payload");
            return;
        };

        let pow_valid = block.meets_pow(self.config.difficulty).unwrap_or(false);
        if !pow_valid || !block.satisfies_temporal_rule() {
            debug!("dropping block that fails pow or the temporal rule");
            return;
        }

        let mut state = self.state.lock().unwrap();
        let tip = state.chain.tip().clone();
        let chain_len = state.chain.len();

        if block.index == chain_len && tip.hash().ok() == Some(block.previous_hash) && tip.nonce < block.timestamp {
            self.stop_mining.store(true, Ordering::SeqCst);
            let included: Vec<Transaction> = block.transactions.iter().skip(1).cloned().collect();
            if state.chain.append(block).is_ok() {
                if let Ok(utxo_set) = state.chain.rebuild_utxo_set() {
                    state.utxo_set = utxo_set;
                }
                state.mempool.retain(|tx| !included.contains(tx));
            }
            drop(state);
            self.stop_mining.store(false, Ordering::SeqCst);
            info!("fast-forwarded chain with peer-mined block");
            return;
        }

        if block.index >= chain_len && block.previous_hash != tip.hash().unwrap_or_else(|_| Hash256::zero()) {
            drop(state);
            let _ = overlay.originate(
                MessageType::RequestBlockchain,
                serde_json::json!(overlay.local_id()),
                Some(envelope.sender.clone()),
            );
            return;
        }

        if block.index + 1 == chain_len
            && (block.nonce, block.timestamp) < (tip.nonce, tip.timestamp)
        {
            drop(state);
            let _ = overlay.originate(
                MessageType::RequestBlockchain,
                serde_json::json!(overlay.local_id()),
                Some(envelope.sender.clone()),
            );
        }
    }

    fn handle_request_blockchain(&self, overlay: &Arc<Overlay>, envelope: &Envelope) {
        let state = self.state.lock().unwrap();
        let Ok(chain_json) = serde_json::to_value(state.chain.blocks()) else {
            return;
        };
        let Ok(mempool_json) = serde_json::to_value(&state.mempool) else {
            return;
        };
        drop(state);
        let payload = serde_json::json!({ "chain": chain_json, "mempool": mempool_json });
        let _ = overlay.originate(MessageType::BlockchainUpdate, payload, Some(envelope.sender.clone()));
    }

    fn handle_blockchain_update(&self, envelope: &Envelope) {
        let Some(blocks_json) = envelope.data.get("chain").cloned() else {
            return;
        };
        let Some(mempool_json) = envelope.data.get("mempool").cloned() else {
            return;
        };
        let Ok(blocks) = serde_json::from_value::<Vec<Block>>(blocks_json) else {
            return;
        };
        let Ok(mempool) = serde_json::from_value::<Vec<Transaction>>(mempool_json) else {
            return;
        };

        let mut state = self.state.lock().unwrap();
        if (blocks.len() as u64) < state.chain.len() {
            return;
        }
        let difficulty = state.chain.difficulty();
        let Ok(new_chain) = Chain::from_blocks(blocks, difficulty) else {
            return;
        };
        let Ok(utxo_set) = new_chain.rebuild_utxo_set() else {
            return;
        };
        state.chain = new_chain;
        state.utxo_set = utxo_set;
        state.mempool = mempool;
        drop(state);
        self.stop_mining.store(false, Ordering::SeqCst);
        info!("adopted peer chain and mempool");
    }

    fn handle_utxos_request(&self, overlay: &Arc<Overlay>, envelope: &Envelope) {
        let Ok(address) = serde_json::from_value::<String>(envelope.data.clone()) else {
            return;
        };
        let state = self.state.lock().unwrap();
        let matching: Vec<(String, Utxo)> = state
            .utxo_set
            .iter()
            .filter(|(_, utxo)| utxo.locking_script.first().is_some_and(|token| token == &address))
            .map(|(key, utxo)| (key.clone(), utxo.clone()))
            .collect();
        drop(state);

        if let Ok(data) = serde_json::to_value(matching) {
            let _ = overlay.originate(MessageType::UtxosResponse, data, Some(envelope.sender.clone()));
        }
    }
}

impl MessageHandler for Miner {
    fn handle(&self, overlay: &Arc<Overlay>, envelope: &Envelope) {
        match envelope.message_type {
            MessageType::Transaction => self.handle_transaction(envelope),
            MessageType::MinedBlock => self.handle_mined_block(overlay, envelope),
            MessageType::RequestBlockchain => self.handle_request_blockchain(overlay, envelope),
            MessageType::BlockchainUpdate => self.handle_blockchain_update(envelope),
            MessageType::UtxosRequest => self.handle_utxos_request(overlay, envelope),
            MessageType::UtxosResponse | MessageType::NewNode | MessageType::KnownNodes => {}
        }
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

    #[test]
    fn submit_transaction_rejects_unknown_input() {
        let chain = Chain::new(50, "genesis", 1).unwrap();
        let miner = Miner::new(MinerConfig { difficulty: 1, ..MinerConfig::default() }, chain).unwrap();

        let input = ledger_core::TxInput::new(Hash256::zero(), 0, vec![]);
        let tx = Transaction::with_timestamp(vec![input], vec![], 0);
        assert!(!miner.submit_transaction(tx));
        assert_eq!(miner.mempool_len(), 0);
    }

    #[test]
    fn mining_loop_produces_a_block_once_mempool_has_enough_transactions() {
        let chain = Chain::new(50, "genesis", 1).unwrap();
        let miner = Miner::new(
            MinerConfig {
                difficulty: 1,
                block_min_transactions: 1,
                reward: 10,
                reward_address: "miner".to_string(),
            },
            chain,
        )
        .unwrap();

        let genesis_tx_hash = {
            let state = miner.state.lock().unwrap();
            state.chain.tip().transactions[0].hash().unwrap()
        };
        let input = ledger_core::TxInput::new(genesis_tx_hash, 0, vec![]);
        let output = ledger_core::TxOutput::new(10, vec![]);
        let tx = Transaction::with_timestamp(vec![input], vec![output], 0);
        assert!(miner.submit_transaction(tx));

        let miner_clone = miner.clone();
        let handle = thread::spawn(move || {
            for _ in 0..200 {
                if miner_clone.chain_height() == 2 {
                    return true;
                }
                thread::sleep(Duration::from_millis(10));
            }
            false
        });

        let _worker = Arc::clone(&miner).spawn();
        assert!(handle.join().unwrap(), "miner never produced a second block");
        miner.stop_mining.store(true, Ordering::SeqCst);
    }
}
