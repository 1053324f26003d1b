//! Error types for the sotto core.
//!
//! Cryptographic and routing failures are contained at the component that
//! detects them: the session turns them into non-fatal events and keeps
//! running. Nothing in this crate aborts the process — the only genuinely
//! fatal condition (no OS randomness source) surfaces inside the RNG itself.

use thiserror::Error;

/// Result type alias for sotto core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sotto core.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Key Agreement
    // ========================================================================

    /// The peer presented a degenerate or low-order public key. The X25519
    /// exchange produced an all-zero shared secret, which means the peer's
    /// point contributed nothing — a malicious or malformed key.
    #[error("invalid peer public key: {0}")]
    InvalidPeerKey(String),

    /// HKDF expansion failed while deriving a session key.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Authenticated Encryption
    // ========================================================================

    /// AEAD encryption failed (invalid key material).
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// The authentication tag did not verify: tampered ciphertext, wrong
    /// key, mismatched associated data, or a misrouted envelope. Decryption
    /// is all-or-nothing; no partial plaintext is ever returned.
    #[error("authentication failed: ciphertext rejected")]
    AuthenticationFailed,

    // ========================================================================
    // Session
    // ========================================================================

    /// A ciphertext referenced a sender we have no established channel with.
    #[error("no secure channel with peer `{0}`")]
    UnknownPeer(String),

    /// An envelope field could not be decoded (bad base64, wrong length).
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] sotto_proto::WireError),
}
