//! Raw TCP gossip/flood overlay: membership, deduplicated broadcast, and
//! directed delivery, all on plain OS threads (no async runtime).

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::message::{Envelope, MessageType, PeerId};
use shared::Hash256;
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Receives envelopes the overlay decided are meant for this node (broadcast,
/// or directed here). Implemented by the miner and the wallet; membership
/// gossip (`new_node`/`known_nodes`) is handled by the overlay itself and
/// never reaches this trait.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, overlay: &Arc<Overlay>, envelope: &Envelope);
}

/// A node's gossip overlay: its peer set, dedup history, and listener.
pub struct Overlay {
    config: NodeConfig,
    local_id: PeerId,
    peers: Mutex<HashSet<PeerId>>,
    seen: Mutex<HashSet<Hash256>>,
    send_lock: Mutex<()>,
    handler: Arc<dyn MessageHandler>,
}

impl Overlay {
    /// Binds the listener, starts the acceptor thread, and floods a
    /// `new_node` announcement to every configured bootstrap peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub fn start(config: NodeConfig, handler: Arc<dyn MessageHandler>) -> NodeResult<Arc<Self>> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        let bound_port = listener.local_addr()?.port();
        let local_id = (config.host.clone(), bound_port);

        let peers: HashSet<PeerId> = config.known_nodes.iter().cloned().collect();

        let overlay = Arc::new(Self {
            config,
            local_id,
            peers: Mutex::new(peers),
            seen: Mutex::new(HashSet::new()),
            send_lock: Mutex::new(()),
            handler,
        });

        overlay.clone().spawn_acceptor(listener);
        overlay.bootstrap()?;
        Ok(overlay)
    }

    #[must_use]
    pub fn local_id(&self) -> PeerId {
        self.local_id.clone()
    }

    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.lock().unwrap().iter().cloned().collect()
    }

    fn bootstrap(self: &Arc<Self>) -> NodeResult<()> {
        if self.peers.lock().unwrap().is_empty() {
            return Ok(());
        }
        let data = serde_json::to_value(self.local_id.clone())?;
        self.originate(MessageType::NewNode, data, None)?;
        Ok(())
    }

    fn spawn_acceptor(self: Arc<Self>, listener: TcpListener) {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let overlay = self.clone();
                        thread::spawn(move || overlay.handle_connection(stream));
                    }
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                }
            }
        });
    }

    fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        match serde_json::from_str::<Envelope>(line.trim_end()) {
            Ok(envelope) => self.receive(envelope),
            Err(err) => warn!(error = %err, "dropped malformed envelope"),
        }
    }

    /// Builds and floods a locally originated message (broadcast if
    /// `receiver` is `None`, routed-via-flood if set).
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized.
    pub fn originate(
        self: &Arc<Self>,
        message_type: MessageType,
        data: serde_json::Value,
        receiver: Option<PeerId>,
    ) -> NodeResult<Envelope> {
        let envelope = Envelope::new(
            message_type,
            data,
            self.local_id.clone(),
            self.config.node_name.clone(),
            receiver,
        )?;
        self.seen.lock().unwrap().insert(envelope.hash);
        self.flood_to_peers(&envelope);
        Ok(envelope)
    }

    /// Handles a received envelope: dedup, flood onward, then dispatch to
    /// the membership layer or the role-specific handler.
    pub fn receive(self: &Arc<Self>, envelope: Envelope) {
        {
            let mut seen = self.seen.lock().unwrap();
            if !seen.insert(envelope.hash) {
                debug!(hash = %envelope.hash, "dropping already-seen envelope");
                return;
            }
        }

        self.flood_to_peers(&envelope);

        match envelope.message_type {
            MessageType::NewNode => self.handle_new_node(&envelope),
            MessageType::KnownNodes => self.handle_known_nodes(&envelope),
            _ => {
                if envelope.is_directed_elsewhere(&self.local_id) {
                    debug!(message_type = ?envelope.message_type, "forwarding without handling (not the receiver)");
                } else {
                    self.handler.handle(self, &envelope);
                }
            }
        }
    }

    fn handle_new_node(self: &Arc<Self>, envelope: &Envelope) {
        let Ok(newcomer) = serde_json::from_value::<PeerId>(envelope.data.clone()) else {
            warn!("new_node envelope carried an unparsable peer id");
            return;
        };
        if newcomer != self.local_id {
            self.add_peer(newcomer);
        }
        let snapshot = self.peers();
        if let Ok(data) = serde_json::to_value(&snapshot) {
            let _ = self.originate(MessageType::KnownNodes, data, None);
        }
    }

    fn handle_known_nodes(&self, envelope: &Envelope) {
        let Ok(incoming) = serde_json::from_value::<Vec<PeerId>>(envelope.data.clone()) else {
            warn!("known_nodes envelope carried an unparsable peer list");
            return;
        };
        for peer in incoming {
            if peer != self.local_id {
                self.add_peer(peer);
            }
        }
    }

    fn add_peer(&self, peer: PeerId) {
        if self.peers.lock().unwrap().insert(peer.clone()) {
            info!(host = %peer.0, port = peer.1, "learned new peer");
        }
    }

    fn flood_to_peers(&self, envelope: &Envelope) {
        for peer in self.peers() {
            if peer == self.local_id {
                continue;
            }
            if let Err(err) = self.send_to(&peer, envelope) {
                debug!(host = %peer.0, port = peer.1, error = %err, "flood send failed");
            }
        }
    }

    /// Sends a single envelope to `peer` over a fresh, one-shot TCP
    /// connection, serialized against every other outbound send.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or write fails.
    pub fn send_to(&self, peer: &PeerId, envelope: &Envelope) -> NodeResult<()> {
        let _guard = self.send_lock.lock().unwrap();
        let mut stream = TcpStream::connect((peer.0.as_str(), peer.1))
            .map_err(|_| NodeError::InvalidAddress(format!("{}:{}", peer.0, peer.1)))?;
        let mut payload = serde_json::to_vec(envelope)?;
        payload.push(b'\n');
        stream.write_all(&payload)?;
        Ok(())
    }
}
