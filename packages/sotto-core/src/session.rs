//! Participant session: per-peer state and message fan-out.
//!
//! A [`ParticipantSession`] owns the local keypair and one
//! [`SecureChannel`] per peer, and drives the per-peer state machine:
//!
//! ```text
//! Unknown ──roster──► AwaitingHandshake ──handshake──► Ready ──left──► Closed
//!    │                                                   ▲               │
//!    └────────────────── handshake ──────────────────────┘◄── handshake ─┘
//! ```
//!
//! The session is sans-I/O: it consumes inbound envelopes, returns outbound
//! envelopes for the transport layer to send, and reports everything else as
//! [`SessionEvent`]s. Crypto and routing failures never escape as errors —
//! they become non-fatal events and the session keeps running.
//!
//! The handshake is bidirectional and idempotent. Each participant
//! broadcasts its own handshake once on connect ([`hello`]) and the relay
//! replays cached handshakes to newcomers, so both sides of every pair
//! always receive each other's key without any directed re-send. Duplicate
//! handshakes for an already-Ready peer are ignored; a *conflicting* key for
//! a known peer is ignored and surfaced as a warning (no key rotation).
//!
//! [`hello`]: ParticipantSession::hello

use std::collections::HashMap;

use sotto_proto::{decode_bytes, decode_fixed, Envelope, NONCE_LEN, PUBLIC_KEY_LEN};

use crate::channel::SecureChannel;
use crate::crypto::{KeyPair, Nonce};
use crate::error::Error;

/// Observable state of one peer, for callers that want to display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Peer id known (from a roster) but no public key yet.
    AwaitingHandshake,
    /// Handshake complete; a secure channel is established.
    Ready,
    /// Peer departed; its session key has been released.
    Closed,
}

enum Peer {
    AwaitingHandshake,
    Ready {
        public_key: [u8; PUBLIC_KEY_LEN],
        channel: SecureChannel,
    },
    Closed,
}

/// Events produced while processing envelopes. All are non-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A handshake completed; messages can now be exchanged with this peer.
    PeerReady { peer_id: String },
    /// A message decrypted successfully.
    MessageReceived { from: String, text: String },
    /// An inbound message was discarded (unknown sender, failed
    /// authentication, malformed fields, or misrouted envelope).
    MessageDropped { from: String, reason: String },
    /// A handshake was discarded (degenerate key or conflicting re-key).
    HandshakeRejected { peer_id: String, reason: String },
    /// A peer disconnected; its channel was torn down.
    PeerLeft { peer_id: String },
    /// The relay reported a protocol error.
    RelayError { message: String },
}

/// Client-side session: local identity, keypair, and per-peer channels.
pub struct ParticipantSession {
    local_id: String,
    keys: KeyPair,
    peers: HashMap<String, Peer>,
}

impl ParticipantSession {
    /// Create a session with a freshly generated X25519 keypair.
    pub fn new(local_id: impl Into<String>) -> Self {
        Self::with_keys(local_id, KeyPair::generate())
    }

    /// Create a session with an explicit keypair (deterministic fixtures).
    pub fn with_keys(local_id: impl Into<String>, keys: KeyPair) -> Self {
        Self {
            local_id: local_id.into(),
            keys,
            peers: HashMap::new(),
        }
    }

    /// This participant's id.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The handshake envelope announcing this participant. Sent once,
    /// immediately after connecting; the relay handles fan-out and replay.
    pub fn hello(&self) -> Envelope {
        Envelope::handshake(&self.local_id, &self.keys.public_bytes())
    }

    /// Observable state of a peer, if the peer is known at all.
    pub fn peer_state(&self, peer_id: &str) -> Option<PeerState> {
        self.peers.get(peer_id).map(|p| match p {
            Peer::AwaitingHandshake => PeerState::AwaitingHandshake,
            Peer::Ready { .. } => PeerState::Ready,
            Peer::Closed => PeerState::Closed,
        })
    }

    /// Ids of all peers with an established channel.
    pub fn ready_peers(&self) -> Vec<&str> {
        self.peers
            .iter()
            .filter(|(_, p)| matches!(p, Peer::Ready { .. }))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Encrypt `text` once per Ready peer and return the resulting
    /// envelopes, one per recipient.
    ///
    /// Peers still awaiting a handshake are silently skipped — messages are
    /// not buffered for them. A per-peer encryption failure is logged and
    /// skips only that peer.
    pub fn send_message(&self, text: &str) -> Vec<Envelope> {
        let mut outbound = Vec::new();

        for (peer_id, peer) in &self.peers {
            let Peer::Ready { channel, .. } = peer else {
                continue;
            };
            match channel.seal(text.as_bytes()) {
                Ok(envelope) => outbound.push(envelope),
                Err(e) => {
                    tracing::warn!(peer = peer_id.as_str(), error = %e, "Skipping peer: encryption failed");
                }
            }
        }

        outbound
    }

    /// Process one inbound envelope, advancing peer state machines and
    /// decrypting messages addressed to us.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Vec<SessionEvent> {
        match envelope {
            Envelope::Handshake { from, public_key } => self.handle_handshake(from, public_key),
            Envelope::Message { from, to, nonce, ciphertext } => {
                self.handle_message(from, to, nonce, ciphertext)
            }
            Envelope::Roster { participants } => {
                for peer_id in participants {
                    if peer_id != self.local_id && !self.peers.contains_key(&peer_id) {
                        self.peers.insert(peer_id, Peer::AwaitingHandshake);
                    }
                }
                Vec::new()
            }
            Envelope::Left { from } => self.handle_left(from),
            Envelope::Error { message } => {
                tracing::warn!(message = message.as_str(), "Relay reported an error");
                vec![SessionEvent::RelayError { message }]
            }
        }
    }

    fn handle_handshake(&mut self, from: String, public_key: String) -> Vec<SessionEvent> {
        if from == self.local_id {
            return Vec::new(); // the relay may echo our own broadcast
        }

        let key_bytes = match decode_fixed::<PUBLIC_KEY_LEN>("public_key", &public_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(peer = from.as_str(), error = %e, "Malformed handshake");
                return vec![SessionEvent::HandshakeRejected {
                    peer_id: from,
                    reason: e.to_string(),
                }];
            }
        };

        if let Some(Peer::Ready { public_key: known, .. }) = self.peers.get(&from) {
            if *known == key_bytes {
                return Vec::new(); // idempotent duplicate
            }
            // No key-rotation semantics: the first key learned for a peer
            // stays pinned for the life of its channel.
            tracing::warn!(peer = from.as_str(), "Conflicting public key in re-handshake, ignoring");
            return vec![SessionEvent::HandshakeRejected {
                peer_id: from,
                reason: "conflicting public key ignored".into(),
            }];
        }

        match SecureChannel::establish(&self.local_id, &from, &self.keys, &key_bytes) {
            Ok(channel) => {
                tracing::debug!(peer = from.as_str(), "Secure channel established");
                self.peers.insert(
                    from.clone(),
                    Peer::Ready { public_key: key_bytes, channel },
                );
                vec![SessionEvent::PeerReady { peer_id: from }]
            }
            Err(e) => {
                tracing::warn!(peer = from.as_str(), error = %e, "Rejected peer handshake");
                self.peers.entry(from.clone()).or_insert(Peer::AwaitingHandshake);
                vec![SessionEvent::HandshakeRejected {
                    peer_id: from,
                    reason: e.to_string(),
                }]
            }
        }
    }

    fn handle_message(
        &mut self,
        from: String,
        to: String,
        nonce: String,
        ciphertext: String,
    ) -> Vec<SessionEvent> {
        if to != self.local_id {
            // Should not happen with a correct relay; drop rather than
            // attempt decryption under the wrong routing context.
            tracing::warn!(from = from.as_str(), to = to.as_str(), "Misrouted envelope");
            return vec![SessionEvent::MessageDropped {
                from,
                reason: format!("misrouted (addressed to `{}`)", to),
            }];
        }

        let channel = match self.peers.get(&from) {
            Some(Peer::Ready { channel, .. }) => channel,
            _ => {
                tracing::warn!(from = from.as_str(), "Ciphertext from peer without a channel");
                return vec![SessionEvent::MessageDropped {
                    from: from.clone(),
                    reason: Error::UnknownPeer(from).to_string(),
                }];
            }
        };

        let decoded = decode_fixed::<NONCE_LEN>("nonce", &nonce)
            .map(Nonce::from_bytes)
            .and_then(|n| Ok((n, decode_bytes("ciphertext", &ciphertext)?)));
        let (nonce, ciphertext) = match decoded {
            Ok(parts) => parts,
            Err(e) => {
                return vec![SessionEvent::MessageDropped {
                    from,
                    reason: e.to_string(),
                }];
            }
        };

        match channel.open(&nonce, &ciphertext) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(text) => vec![SessionEvent::MessageReceived { from, text }],
                Err(_) => vec![SessionEvent::MessageDropped {
                    from,
                    reason: "plaintext is not valid UTF-8".into(),
                }],
            },
            Err(e) => {
                tracing::warn!(from = from.as_str(), error = %e, "Dropping undecryptable message");
                vec![SessionEvent::MessageDropped {
                    from,
                    reason: e.to_string(),
                }]
            }
        }
    }

    fn handle_left(&mut self, from: String) -> Vec<SessionEvent> {
        match self.peers.get_mut(&from) {
            Some(peer) => {
                // Dropping the Ready variant releases the session key
                *peer = Peer::Closed;
                vec![SessionEvent::PeerLeft { peer_id: from }]
            }
            None => Vec::new(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Exchange hello() envelopes between two sessions, as the relay would.
    fn connect(a: &mut ParticipantSession, b: &mut ParticipantSession) {
        let hello_a = a.hello();
        let hello_b = b.hello();
        let events = a.handle_envelope(hello_b);
        assert!(matches!(events[0], SessionEvent::PeerReady { .. }));
        let events = b.handle_envelope(hello_a);
        assert!(matches!(events[0], SessionEvent::PeerReady { .. }));
    }

    fn received_text(events: &[SessionEvent]) -> Option<(&str, &str)> {
        events.iter().find_map(|e| match e {
            SessionEvent::MessageReceived { from, text } => Some((from.as_str(), text.as_str())),
            _ => None,
        })
    }

    #[test]
    fn test_bidirectional_handshake() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");

        connect(&mut alice, &mut bob);

        assert_eq!(alice.peer_state("bob"), Some(PeerState::Ready));
        assert_eq!(bob.peer_state("alice"), Some(PeerState::Ready));
    }

    #[test]
    fn test_hello_then_message_round_trip() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        let outbound = alice.send_message("hello");
        assert_eq!(outbound.len(), 1);

        let events = bob.handle_envelope(outbound.into_iter().next().unwrap());
        assert_eq!(received_text(&events), Some(("alice", "hello")));
    }

    #[test]
    fn test_fan_out_is_per_recipient() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        let mut carol = ParticipantSession::new("carol");
        let mut dave = ParticipantSession::new("dave");

        connect(&mut alice, &mut bob);
        connect(&mut alice, &mut carol);
        connect(&mut alice, &mut dave);

        // Three Ready peers ⇒ exactly three distinct envelopes
        let outbound = alice.send_message("fan-out");
        assert_eq!(outbound.len(), 3);

        let mut delivered = 0;
        for env in &outbound {
            let recipient = env.recipient().unwrap().to_string();
            let session = match recipient.as_str() {
                "bob" => &mut bob,
                "carol" => &mut carol,
                "dave" => &mut dave,
                other => panic!("unexpected recipient {}", other),
            };
            let events = session.handle_envelope(env.clone());
            assert_eq!(received_text(&events), Some(("alice", "fan-out")));
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }

    #[test]
    fn test_cross_recipient_isolation() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        let mut carol = ParticipantSession::new("carol");
        connect(&mut alice, &mut bob);
        connect(&mut alice, &mut carol);

        let outbound = alice.send_message("secret");
        let for_carol = outbound
            .iter()
            .find(|e| e.recipient() == Some("carol"))
            .unwrap();

        // Re-address carol's envelope to bob: bob's channel with alice uses
        // a different session key, so authentication must fail
        let (nonce, ciphertext) = match for_carol {
            Envelope::Message { nonce, ciphertext, .. } => (nonce.clone(), ciphertext.clone()),
            _ => unreachable!(),
        };
        let forged = Envelope::Message {
            from: "alice".into(),
            to: "bob".into(),
            nonce,
            ciphertext,
        };

        let events = bob.handle_envelope(forged);
        assert!(matches!(events[0], SessionEvent::MessageDropped { .. }));
    }

    #[test]
    fn test_late_joiner_misses_earlier_messages() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        // Sent while only bob is Ready: exactly one envelope, none for carol
        let outbound = alice.send_message("hello");
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].recipient(), Some("bob"));

        // Carol joins afterwards; no buffering means she never sees it
        let mut carol = ParticipantSession::new("carol");
        connect(&mut alice, &mut carol);
        assert_eq!(alice.send_message("second").len(), 2);
    }

    #[test]
    fn test_roster_peers_await_handshake_and_are_skipped() {
        let mut alice = ParticipantSession::new("alice");

        alice.handle_envelope(Envelope::Roster {
            participants: vec!["alice".into(), "bob".into()],
        });

        assert_eq!(alice.peer_state("bob"), Some(PeerState::AwaitingHandshake));
        // Not Ready yet ⇒ fan-out skips bob entirely
        assert!(alice.send_message("early").is_empty());
    }

    #[test]
    fn test_duplicate_handshake_is_idempotent() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        let events = alice.handle_envelope(bob.hello());
        assert!(events.is_empty());
        assert_eq!(alice.peer_state("bob"), Some(PeerState::Ready));
    }

    #[test]
    fn test_conflicting_rekey_ignored() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        // A second, different key claiming to be bob
        let imposter = ParticipantSession::new("bob");
        let events = alice.handle_envelope(imposter.hello());
        assert!(matches!(events[0], SessionEvent::HandshakeRejected { .. }));

        // The original channel still works
        let outbound = alice.send_message("still here");
        let events = bob.handle_envelope(outbound.into_iter().next().unwrap());
        assert_eq!(received_text(&events), Some(("alice", "still here")));
    }

    #[test]
    fn test_degenerate_handshake_rejected() {
        let mut alice = ParticipantSession::new("alice");

        let events = alice.handle_envelope(Envelope::handshake("mallory", &[0u8; 32]));
        assert!(matches!(events[0], SessionEvent::HandshakeRejected { .. }));
        assert_eq!(alice.peer_state("mallory"), Some(PeerState::AwaitingHandshake));
        assert!(alice.send_message("x").is_empty());
    }

    #[test]
    fn test_message_from_unknown_peer_dropped() {
        let mut alice = ParticipantSession::new("alice");

        let events = alice.handle_envelope(Envelope::message("ghost", "alice", &[0u8; 12], b"??"));
        match &events[0] {
            SessionEvent::MessageDropped { from, .. } => assert_eq!(from, "ghost"),
            other => panic!("expected drop, got {:?}", other),
        }
    }

    #[test]
    fn test_peer_departure_closes_channel() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        let parting = bob.send_message("bye");

        let events = alice.handle_envelope(Envelope::Left { from: "bob".into() });
        assert_eq!(events, vec![SessionEvent::PeerLeft { peer_id: "bob".into() }]);
        assert_eq!(alice.peer_state("bob"), Some(PeerState::Closed));

        // Key released: a straggler ciphertext from bob is now dropped
        let events = alice.handle_envelope(parting.into_iter().next().unwrap());
        assert!(matches!(events[0], SessionEvent::MessageDropped { .. }));
    }

    #[test]
    fn test_rejoin_after_departure() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        alice.handle_envelope(Envelope::Left { from: "bob".into() });

        // Bob reconnects with a fresh keypair; the Closed peer re-handshakes
        let mut bob2 = ParticipantSession::new("bob");
        let events = alice.handle_envelope(bob2.hello());
        assert!(matches!(events[0], SessionEvent::PeerReady { .. }));

        let outbound = alice.send_message("welcome back");
        bob2.handle_envelope(alice.hello());
        let events = bob2.handle_envelope(outbound.into_iter().next().unwrap());
        assert_eq!(received_text(&events), Some(("alice", "welcome back")));
    }

    #[test]
    fn test_misrouted_envelope_dropped() {
        let mut alice = ParticipantSession::new("alice");
        let mut bob = ParticipantSession::new("bob");
        connect(&mut alice, &mut bob);

        let outbound = alice.send_message("for bob");
        // Deliver bob's envelope to alice instead
        let events = alice.handle_envelope(outbound.into_iter().next().unwrap());
        assert!(matches!(events[0], SessionEvent::MessageDropped { .. }));
    }

    #[test]
    fn test_relay_error_surfaces_as_event() {
        let mut alice = ParticipantSession::new("alice");
        let events = alice.handle_envelope(Envelope::Error {
            message: "name already in use".into(),
        });
        assert_eq!(
            events,
            vec![SessionEvent::RelayError { message: "name already in use".into() }]
        );
    }
}
