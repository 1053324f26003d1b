//! X25519 key agreement.
//!
//! Each participant generates one [`KeyPair`] per process lifetime. The
//! private half never leaves the process; the public half travels in
//! handshake envelopes. Given a peer's public key, the pair produces the
//! raw Diffie-Hellman shared secret that [`super::kdf`] stretches into a
//! session key.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::crypto::SharedSecret;
use crate::error::{Error, Result};

/// An X25519 keypair for key exchange.
///
/// ## Security
///
/// - The secret is zeroized when this struct is dropped
/// - The public key can be shared with anyone
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    /// Private key (secret)
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    /// Public key (derived from the secret)
    public: X25519PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    ///
    /// Uses the operating system's secure random number generator. The only
    /// failure mode is the platform lacking a randomness source, which
    /// aborts inside the RNG — there is no recoverable error path.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create a keypair from raw secret bytes. Deterministic; used in tests
    /// to build reproducible fixtures.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes for transmission in a handshake envelope.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange with a peer's public key.
    ///
    /// Both parties compute the same shared secret:
    /// - Alice: alice_secret × bob_public
    /// - Bob: bob_secret × alice_public
    ///
    /// ## Errors
    ///
    /// Returns [`Error::InvalidPeerKey`] when the exchange is
    /// non-contributory — the shared secret came out all-zero, which happens
    /// only when the peer supplied a low-order or otherwise degenerate
    /// point. Using such a secret would let an active attacker force a
    /// predictable key, so the handshake is rejected instead.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> Result<SharedSecret> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);

        if !shared.was_contributory() {
            return Err(Error::InvalidPeerKey(
                "non-contributory exchange (low-order point)".into(),
            ));
        }

        Ok(SharedSecret::from_bytes(shared.to_bytes()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
