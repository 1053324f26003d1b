//! Relay wire protocol.
//!
//! The relay speaks a simple JSON-over-WebSocket protocol. Every frame is one
//! [`Envelope`]; the same type is used in both directions. All cryptographic
//! payloads are opaque to the relay — E2E encryption happens client-side and
//! the relay only ever reads the `type`, `from` and `to` routing fields.
//!
//! Binary fields (public keys, nonces, ciphertext) travel as standard base64
//! so envelopes stay transport-agnostic text frames.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of an X25519 public key on the wire, in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an AES-GCM nonce on the wire, in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Errors produced while encoding or decoding wire envelopes.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame was not valid JSON for any envelope variant.
    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// A binary field did not contain valid base64.
    #[error("invalid base64 in field `{field}`: {source}")]
    Base64 {
        field: &'static str,
        source: base64::DecodeError,
    },

    /// A fixed-size binary field decoded to the wrong number of bytes.
    #[error("field `{field}` decoded to {actual} bytes, expected {expected}")]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// The unit of transmission between participants and the relay.
///
/// `handshake` and `message` are participant-originated and forwarded by the
/// relay (broadcast and unicast respectively). `roster`, `left` and `error`
/// are relay-originated notifications; the relay drops them if a client
/// tries to send one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A participant announcing itself and its X25519 public key.
    /// Broadcast-class: the relay fans it out to every other participant.
    Handshake {
        from: String,
        /// Base64-encoded 32-byte X25519 public key.
        public_key: String,
    },

    /// An encrypted message for exactly one recipient.
    /// Unicast-class: forwarded verbatim to `to` if connected, else dropped.
    Message {
        from: String,
        to: String,
        /// Base64-encoded 12-byte AES-GCM nonce.
        nonce: String,
        /// Base64-encoded ciphertext with the auth tag appended.
        ciphertext: String,
    },

    /// Membership snapshot sent to a participant right after registration.
    Roster { participants: Vec<String> },

    /// Notification that a participant disconnected.
    Left { from: String },

    /// Relay-originated protocol error. Advisory; clients log and continue.
    Error { message: String },
}

impl Envelope {
    /// Build a handshake envelope from raw public key bytes.
    pub fn handshake(from: &str, public_key: &[u8; PUBLIC_KEY_LEN]) -> Self {
        Self::Handshake {
            from: from.to_string(),
            public_key: BASE64.encode(public_key),
        }
    }

    /// Build a message envelope from raw nonce and ciphertext bytes.
    pub fn message(from: &str, to: &str, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Self {
        Self::Message {
            from: from.to_string(),
            to: to.to_string(),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        }
    }

    /// The sending participant, for envelope kinds that carry one.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Handshake { from, .. } | Self::Message { from, .. } | Self::Left { from } => {
                Some(from)
            }
            Self::Roster { .. } | Self::Error { .. } => None,
        }
    }

    /// The addressed recipient (only `message` envelopes are unicast).
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Message { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Decode a base64 field into a fixed-size byte array.
pub fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], WireError> {
    let bytes = decode_bytes(field, value)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| WireError::Length {
        field,
        expected: N,
        actual,
    })
}

/// Decode a variable-length base64 field.
pub fn decode_bytes(field: &'static str, value: &str) -> Result<Vec<u8>, WireError> {
    BASE64
        .decode(value)
        .map_err(|source| WireError::Base64 { field, source })
}
