//! # Cryptography Module
//!
//! All primitives used by the envelope protocol.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ENVELOPE CRYPTOGRAPHY                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   blob                                                                  │
//! │     │  Ed25519 sign (origin)            ← inner signature              │
//! │     ▼                                                                   │
//! │   sig || blob                                                           │
//! │     │  X25519 + HKDF + XChaCha20-Poly1305 (nonce[24])                   │
//! │     ▼                                                                   │
//! │   ciphertext                                                            │
//! │     │  Ed25519 sign (origin)            ← outer signature              │
//! │     ▼                                                                   │
//! │   sig || ciphertext  = envelope payload                                 │
//! │     │                                                                   │
//! │     └─► SHA-256 → custody fingerprint                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | Ed25519 | Inner and outer signatures |
//! | X25519 | Key agreement |
//! | XChaCha20-Poly1305 | Box cipher, 24-byte random nonces |
//! | HKDF-SHA256 | Box key derivation |
//! | SHA-256 | Payload fingerprints |
//! | AES-256-GCM | Private key files at rest |

mod encryption;
mod hash;
mod keys;
mod signing;

pub use encryption::{
    open_at_rest, open_box, seal_at_rest, seal_box, BoxKey, Nonce, SharedSecret, KEY_SIZE,
    NONCE_SIZE, TAG_SIZE,
};
pub use hash::Fingerprint;
pub use keys::{EncryptionKeyPair, PublicKeys, SigningKeyPair};
pub use signing::{open_attached, sign, sign_attached, verify, Signature, SIGNATURE_SIZE};

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
