//! # Cryptography Module
//!
//! Cryptographic primitives for sotto's end-to-end encryption.
//!
//! ## Scheme Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     PER-PAIR ENCRYPTION SCHEME                      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  1. Key Exchange: X25519 ECDH                                       │
//! │     alice_private × bob_public = shared secret (32 bytes)           │
//! │     (rejected if the exchange is non-contributory, i.e. all-zero)   │
//! │                                                                     │
//! │  2. Key Derivation: HKDF-SHA256                                     │
//! │     salt = "temp-chat-e2ee", info = "shared-room-key"               │
//! │     shared secret → session key (32 bytes)                          │
//! │                                                                     │
//! │  3. Encryption: AES-256-GCM                                         │
//! │     • 256-bit session key, one per participant pair                 │
//! │     • 96-bit random nonce, fresh per message                        │
//! │     • AAD binds sender and recipient ids to the ciphertext          │
//! │                                                                     │
//! │  Both sides derive the identical session key independently, so a    │
//! │  single key serves the pair in both directions.                     │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! 1. **Key zeroization**: secret keys and derived keys are zeroized on drop
//! 2. **Constant-time operations**: dalek primitives throughout
//! 3. **Secure randomness**: `rand::rngs::OsRng` for keys and nonces
//! 4. **No nonce reuse**: a fresh random 96-bit nonce per encryption

mod encryption;
mod kdf;
mod keys;

pub use encryption::{decrypt, encrypt, Nonce, SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::{domain, SharedSecret};
pub use keys::KeyPair;
