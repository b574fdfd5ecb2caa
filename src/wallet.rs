//! The wallet role: a UTXO mirror maintained by polling peers, balance
//! queries, and spend construction.

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::message::{Envelope, MessageType};
use crate::overlay::{MessageHandler, Overlay};
use base64::{engine::general_purpose::STANDARD, Engine};
use ledger_core::{Transaction, TxInput, TxOutput, Utxo, UtxoSet};
use shared::{sign_spend, Hash256, KeyPair};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

struct Mirror {
    utxos: UtxoSet,
    pending_refresh: bool,
}

/// A wallet: a keypair, its own address, and a locally mirrored view of the
/// UTXOs locked to that address, refreshed on demand via `utxos_request`.
pub struct Wallet {
    keypair: KeyPair,
    address: String,
    mirror: Mutex<Mirror>,
    refreshed: Condvar,
    overlay: Mutex<Option<Arc<Overlay>>>,
}

impl Wallet {
    /// Generates a fresh keypair and derives this wallet's address from it.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> NodeResult<Arc<Self>> {
        let keypair = KeyPair::generate()?;
        let address = shared::derive_address_hex(&keypair.public_key);
        Ok(Arc::new(Self {
            keypair,
            address,
            mirror: Mutex::new(Mirror {
                utxos: UtxoSet::new(),
                pending_refresh: false,
            }),
            refreshed: Condvar::new(),
            overlay: Mutex::new(None),
        }))
    }

    pub fn attach_overlay(&self, overlay: Arc<Overlay>) {
        *self.overlay.lock().unwrap() = Some(overlay);
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    fn locking_script(&self) -> Vec<String> {
        vec![self.address.clone(), "OP_EQUAL".to_string()]
    }

    /// Broadcasts a `utxos_request` for this wallet's address and blocks until
    /// a matching `utxos_response` arrives or the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Timeout` if no response arrives in time, or
    /// propagates an overlay error if the request cannot be sent.
    pub fn refresh_balance(&self) -> NodeResult<()> {
        let overlay = self
            .overlay
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| NodeError::Timeout("overlay not attached".to_string()))?;

        {
            let mut mirror = self.mirror.lock().unwrap();
            mirror.pending_refresh = true;
        }
        overlay.originate(MessageType::UtxosRequest, serde_json::json!(self.address), None)?;

        let mirror = self.mirror.lock().unwrap();
        let (mirror, timed_out) = self
            .refreshed
            .wait_timeout_while(mirror, REFRESH_TIMEOUT, |m| m.pending_refresh)
            .unwrap();
        if timed_out.timed_out() {
            return Err(NodeError::Timeout("utxos_response".to_string()));
        }
        drop(mirror);
        Ok(())
    }

    /// Sum of every mirrored UTXO locked to this wallet's address. Reflects
    /// only the last successful [`Wallet::refresh_balance`].
    #[must_use]
    pub fn get_balance(&self) -> u64 {
        self.mirror.lock().unwrap().utxos.balance_for_script(&self.locking_script())
    }

    /// Builds and broadcasts a transaction paying `amount` to `receiver`,
    /// spending the mirrored UTXO set greedily and returning any leftover
    /// value to this wallet as a change output.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InsufficientBalance` if the mirrored balance is
    /// below `amount`, or propagates an overlay error if broadcast fails.
    pub fn send_crypto(&self, receiver: &str, amount: u64) -> NodeResult<Transaction> {
        let own_script = self.locking_script();
        let selected: Vec<(String, Utxo)> = {
            let mirror = self.mirror.lock().unwrap();
            match mirror.utxos.select_utxos(&own_script, amount) {
                Ok(found) => found.into_iter().map(|(key, utxo)| (key, utxo.clone())).collect(),
                Err(_) => {
                    let available = mirror.utxos.balance_for_script(&own_script);
                    return Err(NodeError::InsufficientBalance {
                        needed: amount,
                        available,
                    });
                }
            }
        };

        let total_selected: u64 = selected.iter().map(|(_, utxo)| utxo.amount).sum();
        let mut inputs = Vec::with_capacity(selected.len());
        for (key, _utxo) in &selected {
            let (tx_hash_hex, output_index) = split_outpoint(key)?;
            let tx_hash = Hash256::from_hex(&tx_hash_hex)?;
            let signature = sign_spend(&tx_hash, output_index, &self.keypair)?;
            let signature_bytes = serde_json::to_vec(&signature)?;
            let unlocking_script = vec![STANDARD.encode(signature_bytes), key.clone()];
            inputs.push(TxInput::new(tx_hash, output_index, unlocking_script));
        }

        let mut outputs = vec![TxOutput::new(
            amount,
            vec![receiver.to_string(), "OP_EQUAL".to_string()],
        )];
        let change = total_selected - amount;
        if change > 0 {
            outputs.push(TxOutput::new(change, own_script));
        }

        let tx = Transaction::new(inputs, outputs);

        if let Some(overlay) = self.overlay.lock().unwrap().as_ref() {
            let data = serde_json::to_value(&tx)?;
            overlay.originate(MessageType::Transaction, data, None)?;
        }

        Ok(tx)
    }
}

fn split_outpoint(key: &str) -> NodeResult<(String, u32)> {
    let (hash, index) = key
        .rsplit_once(':')
        .ok_or_else(|| NodeError::InvalidAddress(key.to_string()))?;
    let index: u32 = index
        .parse()
        .map_err(|_| NodeError::InvalidAddress(key.to_string()))?;
    Ok((hash.to_string(), index))
}

impl MessageHandler for Wallet {
    fn handle(&self, _overlay: &Arc<Overlay>, envelope: &Envelope) {
        if envelope.message_type != MessageType::UtxosResponse {
            return;
        }
        let Ok(matching) = serde_json::from_value::<Vec<(String, Utxo)>>(envelope.data.clone())
        else {
            warn!("utxos_response envelope carried an unparsable payload");
            return;
        };

        let mut mirror = self.mirror.lock().unwrap();
        if !mirror.pending_refresh {
            debug!("dropping unsolicited utxos_response");
            return;
        }
        mirror.utxos = UtxoSet::new();
        for (key, utxo) in matching {
            mirror.utxos.insert(key, utxo);
        }
        mirror.pending_refresh = false;
        self.refreshed.notify_all();
    }
}

/// Convenience for wiring a wallet onto a fresh overlay with the given node
/// configuration.
///
/// # Errors
///
/// Returns an error if the overlay cannot bind.
pub fn start(config: NodeConfig, wallet: Arc<Wallet>) -> NodeResult<Arc<Overlay>> {
    let overlay = Overlay::start(config, wallet.clone())?;
    wallet.attach_overlay(overlay.clone());
    Ok(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::Script;
    use std::thread;

    fn script(tokens: &[&str]) -> Script {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn get_balance_is_zero_before_any_refresh() {
        let wallet = Wallet::generate().unwrap();
        assert_eq!(wallet.get_balance(), 0);
    }

    #[test]
    fn utxos_response_populates_the_mirror_and_wakes_the_waiter() {
        let wallet = Wallet::generate().unwrap();
        {
            let mut mirror = wallet.mirror.lock().unwrap();
            mirror.pending_refresh = true;
        }

        let own_script = wallet.locking_script();
        let payload = serde_json::json!([("tx:0".to_string(), Utxo::new(250, own_script))]);
        let envelope = Envelope::new(
            MessageType::UtxosResponse,
            payload,
            ("127.0.0.1".to_string(), 1),
            "peer".to_string(),
            None,
        )
        .unwrap();

        let overlay_config = NodeConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..NodeConfig::default()
        };
        let dummy_overlay = Overlay::start(overlay_config, wallet.clone()).unwrap();
        wallet.handle(&dummy_overlay, &envelope);

        assert_eq!(wallet.get_balance(), 250);
    }

    #[test]
    fn send_crypto_fails_fast_when_mirror_is_empty() {
        let wallet = Wallet::generate().unwrap();
        let err = wallet.send_crypto("someone-else", 10).unwrap_err();
        assert!(matches!(err, NodeError::InsufficientBalance { .. }));
    }

    #[test]
    fn send_crypto_builds_signed_inputs_and_a_change_output() {
        let wallet = Wallet::generate().unwrap();
        let outpoint = format!("{}:0", Hash256::keccak256(b"prior-tx"));
        {
            let mut mirror = wallet.mirror.lock().unwrap();
            mirror
                .utxos
                .insert(outpoint, Utxo::new(1_000, wallet.locking_script()));
        }

        let tx = wallet.send_crypto("receiver-addr", 400).unwrap();
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].amount, 400);
        assert_eq!(tx.outputs[1].amount, 600);
        assert_eq!(tx.inputs[0].unlocking_script.len(), 2);
        let _ = script(&["unused"]);
        thread::yield_now();
    }
}
