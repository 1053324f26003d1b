//! Session key derivation.
//!
//! The raw X25519 output is never used as an encryption key directly.
//! HKDF-SHA256 stretches it under fixed protocol constants so both peers of
//! a pair independently arrive at the identical AES-256-GCM session key:
//!
//! ```text
//! HKDF-SHA256(
//!     ikm  = X25519 shared secret,
//!     salt = "temp-chat-e2ee",
//!     info = "shared-room-key",
//! ) → session key (32 bytes)
//! ```
//!
//! Derivation is deterministic — same secret, same constants, same key —
//! which is what makes bidirectional decryption work without any key
//! negotiation beyond the handshake itself.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::crypto::{SessionKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Fixed protocol constants for HKDF.
///
/// These are part of the wire protocol: changing either breaks key agreement
/// with existing clients.
pub mod domain {
    /// HKDF salt for session key derivation.
    pub const HKDF_SALT: &[u8] = b"temp-chat-e2ee";

    /// HKDF info string for session key derivation.
    pub const SESSION_KEY: &[u8] = b"shared-room-key";
}

/// A shared secret produced by X25519 key exchange.
///
/// Only useful as HKDF input; zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    /// Create from raw DH output.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes (for comparison in tests).
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Derive the symmetric session key for this participant pair.
    pub fn derive_session_key(&self) -> Result<SessionKey> {
        let hkdf = Hkdf::<Sha256>::new(Some(domain::HKDF_SALT), &self.bytes);
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(domain::SESSION_KEY, &mut key)
            .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

        Ok(SessionKey::from_bytes(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_derivation_deterministic() {
        let secret = SharedSecret::from_bytes([7u8; 32]);
        let key1 = secret.derive_session_key().unwrap();
        let key2 = secret.derive_session_key().unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_secrets_different_keys() {
        let key1 = SharedSecret::from_bytes([1u8; 32]).derive_session_key().unwrap();
        let key2 = SharedSecret::from_bytes([2u8; 32]).derive_session_key().unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_session_key_symmetry() {
        // Both ends of a pair must derive the identical session key
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let alice_key = alice
            .diffie_hellman(&bob.public_bytes())
            .unwrap()
            .derive_session_key()
            .unwrap();
        let bob_key = bob
            .diffie_hellman(&alice.public_bytes())
            .unwrap()
            .derive_session_key()
            .unwrap();

        assert_eq!(alice_key.as_bytes(), bob_key.as_bytes());
    }
}
