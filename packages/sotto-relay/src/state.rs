//! Server state management.
//!
//! Tracks connected participants and their cached handshakes. All data
//! structures are concurrent (DashMap) for lock-free access; forwarding a
//! message never blocks on a slow recipient because every participant has
//! its own unbounded outbound channel drained by a dedicated sender task.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use sotto_proto::Envelope;

/// Default maximum size of a single inbound text frame, in bytes.
const DEFAULT_MAX_ENVELOPE_BYTES: usize = 64 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub bind: String,
    /// Inbound frames larger than this are rejected without parsing.
    pub max_envelope_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".to_string(),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
        }
    }
}

/// A connected participant's sender channel.
pub type ClientSender = mpsc::UnboundedSender<Envelope>;

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Name → sender channel for connected participants.
    /// Inserted on registration, removed on disconnect.
    participants: Arc<DashMap<String, ClientSender>>,

    /// Name → that participant's handshake envelope, replayed to newcomers
    /// so late joiners learn every present key without a directed re-send.
    handshakes: Arc<DashMap<String, Envelope>>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            participants: Arc::new(DashMap::new()),
            handshakes: Arc::new(DashMap::new()),
            config,
        }
    }

    // ── Participant Management ────────────────────────────────────────────

    /// Register a participant atomically. Returns false if the name is
    /// already taken — check-and-insert happens under one map entry so two
    /// racing connections cannot both claim a name.
    pub fn register(&self, name: &str, sender: ClientSender, handshake: Envelope) -> bool {
        match self.participants.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(sender);
                self.handshakes.insert(name.to_string(), handshake);
                tracing::info!(name = name, "Participant registered");
                true
            }
        }
    }

    /// Unregister a participant when they disconnect. Their cached handshake
    /// goes too, so a future joiner never handshakes with a ghost.
    pub fn unregister(&self, name: &str) {
        self.participants.remove(name);
        self.handshakes.remove(name);
        tracing::info!(name = name, "Participant unregistered");
    }

    /// Check whether a participant is currently connected.
    pub fn is_connected(&self, name: &str) -> bool {
        self.participants.contains_key(name)
    }

    /// Send an envelope to one participant. Returns true if the envelope was
    /// queued; false means the recipient is gone and the envelope is dropped.
    pub fn send_to(&self, name: &str, envelope: Envelope) -> bool {
        if let Some(sender) = self.participants.get(name) {
            sender.send(envelope).is_ok()
        } else {
            false
        }
    }

    /// Send an envelope to every participant except `exclude`.
    pub fn broadcast_except(&self, exclude: &str, envelope: &Envelope) {
        for entry in self.participants.iter() {
            if entry.key() != exclude {
                let _ = entry.value().send(envelope.clone());
            }
        }
    }

    /// Names of all connected participants.
    pub fn roster(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Cached handshakes of everyone except `exclude`, for replay to a
    /// newcomer.
    pub fn cached_handshakes(&self, exclude: &str) -> Vec<Envelope> {
        self.handshakes
            .iter()
            .filter(|entry| entry.key() != exclude)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Refresh a participant's cached handshake (re-announcement).
    pub fn update_handshake(&self, name: &str, handshake: Envelope) {
        self.handshakes.insert(name.to_string(), handshake);
    }

    /// Number of currently connected participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}
