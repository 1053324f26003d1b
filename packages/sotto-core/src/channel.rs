//! Secure channel between one local participant and one remote peer.
//!
//! A [`SecureChannel`] owns the session key derived for a (local, remote)
//! pair and converts between plaintext and `message` envelopes. The
//! associated data authenticated with every ciphertext is the routing
//! context `"<sender>|<recipient>"`, so a ciphertext re-addressed to a
//! different recipient — or reflected back at its sender — fails
//! authentication rather than decrypting.
//!
//! Channels hold no interior mutability and nonces are random, so a channel
//! is safe to use from multiple threads behind a shared reference.

use sotto_proto::Envelope;

use crate::crypto::{decrypt, encrypt, KeyPair, Nonce};
use crate::crypto::SessionKey;
use crate::error::Result;

/// An established end-to-end encrypted channel with a single peer.
pub struct SecureChannel {
    local_id: String,
    peer_id: String,
    key: SessionKey,
}

impl SecureChannel {
    /// Establish a channel: X25519 exchange with the peer's public key,
    /// then HKDF into the pair's session key.
    ///
    /// Fails with [`crate::Error::InvalidPeerKey`] on a degenerate peer key.
    pub fn establish(
        local_id: &str,
        peer_id: &str,
        keys: &KeyPair,
        peer_public: &[u8; 32],
    ) -> Result<Self> {
        let shared = keys.diffie_hellman(peer_public)?;
        let key = shared.derive_session_key()?;

        Ok(Self {
            local_id: local_id.to_string(),
            peer_id: peer_id.to_string(),
            key,
        })
    }

    /// The remote peer this channel encrypts for.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Encrypt a plaintext into a `message` envelope addressed to the peer.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Envelope> {
        let aad = routing_aad(&self.local_id, &self.peer_id);
        let (nonce, ciphertext) = encrypt(&self.key, plaintext, &aad)?;

        Ok(Envelope::message(
            &self.local_id,
            &self.peer_id,
            nonce.as_bytes(),
            &ciphertext,
        ))
    }

    /// Decrypt a ciphertext received from the peer.
    ///
    /// The AAD is reconstructed for the inbound direction (peer → us);
    /// anything that does not verify is rejected whole.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let aad = routing_aad(&self.peer_id, &self.local_id);
        decrypt(&self.key, nonce, ciphertext, &aad)
    }
}

/// Associated data binding a ciphertext to its routing context.
fn routing_aad(sender: &str, recipient: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(sender.len() + recipient.len() + 1);
    aad.extend_from_slice(sender.as_bytes());
    aad.push(b'|');
    aad.extend_from_slice(recipient.as_bytes());
    aad
}
