//! # Encryption Module
//!
//! Public-key authenticated encryption between exactly two nodes ("box"),
//! plus the symmetric sealing used for private key files at rest.
//!
//! ## Box Construction
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           BOX SEAL                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Shared secret                                                  │
//! │    origin X25519 private × destination X25519 public → 32 bytes         │
//! │                                                                         │
//! │  Step 2: Box key                                                        │
//! │    HKDF-SHA256(ikm = shared secret,                                     │
//! │                salt = sender public || recipient public,                │
//! │                info = "endrun-box-v1") → 32 bytes                       │
//! │                                                                         │
//! │  Step 3: XChaCha20-Poly1305(key, nonce[24], plaintext, aad)             │
//! │    → ciphertext || 16-byte tag                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The destination computes the same secret from its private key and the
//! origin's public key. Any change to the ciphertext, nonce, associated
//! data or either key makes opening fail.

use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::crypto::EncryptionKeyPair;
use crate::error::{Error, Result};

/// Size of the box nonce in bytes (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce used for at-rest sealing
const AT_REST_NONCE_SIZE: usize = 12;

const BOX_KEY_INFO: &[u8] = b"endrun-box-v1";

/// A nonce (number used once) for the box
///
/// **Never reuse a nonce with the same key pair.** Nonces are drawn from
/// the OS RNG; at 192 bits random collisions are not a practical concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A shared secret derived from X25519 key exchange
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    /// Create from raw DH output
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Derive the box key for a sender/recipient pair
    pub fn derive_box_key(&self, sender_public: &[u8; 32], recipient_public: &[u8; 32]) -> Result<BoxKey> {
        let mut salt = [0u8; 64];
        salt[..32].copy_from_slice(sender_public);
        salt[32..].copy_from_slice(recipient_public);

        let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), &self.bytes);
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(BOX_KEY_INFO, &mut key)
            .map_err(|_| Error::Internal("HKDF expansion failed".into()))?;

        Ok(BoxKey(key))
    }
}

/// Symmetric key for one origin/destination pair
#[derive(ZeroizeOnDrop)]
pub struct BoxKey([u8; KEY_SIZE]);

/// Encrypt `plaintext` from `ours` to the holder of `their_public`
pub fn seal_box(
    ours: &EncryptionKeyPair,
    their_public: &[u8; 32],
    nonce: &Nonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let shared = SharedSecret::from_bytes(ours.diffie_hellman(their_public));
    let key = shared.derive_box_key(&ours.public_bytes(), their_public)?;

    let cipher = XChaCha20Poly1305::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), Payload { msg: plaintext, aad })
        .map_err(|e| Error::EncryptionFailed(e.to_string()))
}

/// Decrypt a box sealed by the holder of `their_public` for `ours`
///
/// Returns `DecryptionFailed` on wrong keys, wrong nonce, wrong associated
/// data or any modification of the ciphertext.
pub fn open_box(
    ours: &EncryptionKeyPair,
    their_public: &[u8; 32],
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let shared = SharedSecret::from_bytes(ours.diffie_hellman(their_public));
    let key = shared.derive_box_key(their_public, &ours.public_bytes())?;

    let cipher = XChaCha20Poly1305::new_from_slice(&key.0)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(XNonce::from_slice(nonce.as_bytes()), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))
}

// ============================================================================
// AT-REST SEALING
// ============================================================================

/// Seal data with AES-256-GCM under a storage key
///
/// Output is `nonce (12 bytes) || ciphertext || tag`.
pub fn seal_at_rest(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; AT_REST_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid storage key: {}", e)))?;

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Open data sealed by [`seal_at_rest`]
pub fn open_at_rest(key: &[u8; KEY_SIZE], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < AT_REST_NONCE_SIZE + TAG_SIZE {
        return Err(Error::StorageReadError("Sealed data too short".into()));
    }
    let (nonce, ciphertext) = sealed.split_at(AT_REST_NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid storage key: {}", e)))?;

    cipher
        .decrypt(AesNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::DecryptionFailed("storage key does not open sealed data".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_round_trip() {
        let origin = EncryptionKeyPair::generate();
        let destination = EncryptionKeyPair::generate();
        let nonce = Nonce::random();

        let ciphertext =
            seal_box(&origin, &destination.public_bytes(), &nonce, b"bundle", b"aad").unwrap();
        assert_eq!(ciphertext.len(), 6 + TAG_SIZE);

        let plaintext =
            open_box(&destination, &origin.public_bytes(), &nonce, &ciphertext, b"aad").unwrap();
        assert_eq!(plaintext, b"bundle");
    }

    #[test]
    fn test_box_wrong_recipient_fails() {
        let origin = EncryptionKeyPair::generate();
        let destination = EncryptionKeyPair::generate();
        let eavesdropper = EncryptionKeyPair::generate();
        let nonce = Nonce::random();

        let ciphertext =
            seal_box(&origin, &destination.public_bytes(), &nonce, b"bundle", b"").unwrap();
        let result = open_box(&eavesdropper, &origin.public_bytes(), &nonce, &ciphertext, b"");

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_box_wrong_nonce_fails() {
        let origin = EncryptionKeyPair::generate();
        let destination = EncryptionKeyPair::generate();

        let ciphertext =
            seal_box(&origin, &destination.public_bytes(), &Nonce::random(), b"bundle", b"").unwrap();
        let result = open_box(&destination, &origin.public_bytes(), &Nonce::random(), &ciphertext, b"");

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_box_wrong_aad_fails() {
        let origin = EncryptionKeyPair::generate();
        let destination = EncryptionKeyPair::generate();
        let nonce = Nonce::random();

        let ciphertext =
            seal_box(&origin, &destination.public_bytes(), &nonce, b"bundle", b"ttl-1").unwrap();
        let result = open_box(&destination, &origin.public_bytes(), &nonce, &ciphertext, b"ttl-2");

        assert!(result.is_err());
    }

    #[test]
    fn test_random_nonces_differ() {
        assert_ne!(Nonce::random(), Nonce::random());
    }

    #[test]
    fn test_at_rest_round_trip() {
        let key = [42u8; 32];
        let sealed = seal_at_rest(&key, b"private key record", b"node1").unwrap();
        let opened = open_at_rest(&key, &sealed, b"node1").unwrap();
        assert_eq!(opened, b"private key record");
    }

    #[test]
    fn test_at_rest_wrong_key_or_aad_fails() {
        let sealed = seal_at_rest(&[42u8; 32], b"secret", b"node1").unwrap();
        assert!(open_at_rest(&[43u8; 32], &sealed, b"node1").is_err());
        assert!(open_at_rest(&[42u8; 32], &sealed, b"node2").is_err());
        assert!(open_at_rest(&[42u8; 32], &[0u8; 4], b"node1").is_err());
    }
}
