//! # Sotto Core
//!
//! Client-side library for end-to-end encrypted chat over an untrusted
//! relay. The relay routes opaque envelopes; all key material and plaintext
//! stay on the participants' machines.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SOTTO CORE MODULES                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌───────────────────────────────────────────────────────────┐   │
//! │  │                  ParticipantSession                       │   │
//! │  │  per-peer state machine, handshake intake, fan-out        │   │
//! │  └───────────────┬───────────────────────────────────────────┘   │
//! │                  │ one per peer                                  │
//! │  ┌───────────────▼───────────────────────────────────────────┐   │
//! │  │                   SecureChannel                           │   │
//! │  │  seal / open with routing-bound AAD                       │   │
//! │  └───────────────┬───────────────────────────────────────────┘   │
//! │                  │                                               │
//! │  ┌───────────────▼───────────────────────────────────────────┐   │
//! │  │                      crypto                               │   │
//! │  │  X25519 exchange → HKDF-SHA256 → AES-256-GCM              │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the whole library
//! - [`crypto`] - Cryptographic primitives (key agreement, KDF, AEAD)
//! - [`channel`] - Per-pair secure channel (seal/open)
//! - [`session`] - Participant session (peer lifecycle, events, fan-out)
//!
//! ## Security Model
//!
//! Pairwise confidentiality only. Each (sender, recipient) pair shares one
//! AES-256-GCM key derived from an X25519 exchange; the relay never holds
//! keys or plaintext. There is no authentication binding a public key to a
//! display name — anyone can claim any name at the relay — and no forward
//! secrecy beyond the lifetime of a session's ephemeral keypair.

pub mod channel;
pub mod crypto;
pub mod error;
pub mod session;

pub use channel::SecureChannel;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use session::{ParticipantSession, PeerState, SessionEvent};
