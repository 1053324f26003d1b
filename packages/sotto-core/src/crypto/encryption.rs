//! Authenticated encryption with AES-256-GCM.
//!
//! Every outgoing message is encrypted separately for every recipient under
//! that pair's session key. The associated data supplied by the caller binds
//! each ciphertext to its routing context, so an envelope replayed to a
//! different recipient fails authentication instead of decrypting.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits).
/// The tag is appended to the ciphertext by the cipher.
pub const TAG_SIZE: usize = 16;

/// Size of the session key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// A nonce (number used once) for AES-GCM encryption.
///
/// ## Critical Security Requirement
///
/// **Never reuse a nonce with the same key.** Nonce reuse breaks AES-GCM
/// completely: it allows recovering the authentication key and forging
/// messages. We use random nonces, safe for up to 2^32 messages per key
/// (birthday bound for 96-bit nonces) — far beyond a chat session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce.
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes (the wire side of decryption).
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM session key for one participant pair.
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Create from raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes (test fixtures only).
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Encrypt a plaintext under a session key.
///
/// Generates a fresh random nonce and returns it alongside the ciphertext;
/// the nonce is not secret and must accompany the ciphertext for decryption.
/// `aad` is authenticated but not encrypted.
pub fn encrypt(key: &SessionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("invalid key: {}", e)))?;

    let payload = Payload { msg: plaintext, aad };

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("encryption failed: {}", e)))?;

    Ok((nonce, ciphertext))
}

/// Decrypt a ciphertext under a session key.
///
/// All-or-nothing: returns [`Error::AuthenticationFailed`] and no data
/// whatsoever if the tag does not verify — tampered ciphertext, wrong key,
/// wrong nonce, or mismatched associated data.
pub fn decrypt(key: &SessionKey, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("invalid key: {}", e)))?;

    let payload = Payload { msg: ciphertext, aad };

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|_| Error::AuthenticationFailed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = SessionKey::from_bytes([42u8; 32]);
        let plaintext = b"Hello, World!";
        let aad = b"alice|bob";

        let (nonce, ciphertext) = encrypt(&key, plaintext, aad).unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext, aad).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = SessionKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"", b"").unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext, b"").unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_any_single_bit_flip_fails() {
        let key = SessionKey::from_bytes([42u8; 32]);
        let (nonce, ciphertext) = encrypt(&key, b"attack at dawn", b"ctx").unwrap();

        // Flipping any single bit anywhere in the ciphertext (including the
        // embedded tag) must be detected
        for byte_idx in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = ciphertext.clone();
                tampered[byte_idx] ^= 1 << bit;
                let result = decrypt(&key, &nonce, &tampered, b"ctx");
                assert!(
                    matches!(result, Err(Error::AuthenticationFailed)),
                    "bit {} of byte {} not detected",
                    bit,
                    byte_idx
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SessionKey::from_bytes([42u8; 32]);
        let key2 = SessionKey::from_bytes([99u8; 32]);

        let (nonce, ciphertext) = encrypt(&key1, b"secret", b"").unwrap();
        let result = decrypt(&key2, &nonce, &ciphertext, b"");

        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = SessionKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"secret", b"alice|bob").unwrap();
        let result = decrypt(&key, &nonce, &ciphertext, b"alice|carol");

        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_nonce_non_reuse() {
        let key = SessionKey::from_bytes([42u8; 32]);

        let (nonce1, ct1) = encrypt(&key, b"same plaintext", b"").unwrap();
        let (nonce2, ct2) = encrypt(&key, b"same plaintext", b"").unwrap();

        // Encrypting the same plaintext twice must yield different nonces
        // and different ciphertexts
        assert_ne!(nonce1, nonce2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_ciphertext_carries_tag() {
        let key = SessionKey::from_bytes([42u8; 32]);
        let plaintext = b"sized";

        let (_, ciphertext) = encrypt(&key, plaintext, b"").unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
    }
}
