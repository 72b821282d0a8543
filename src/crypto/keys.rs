//! # Key Management
//!
//! Key pairs owned by a node.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SigningKeyPair (Ed25519)                                               │
//! │  • Inner signature over the blob (non-repudiation)                      │
//! │  • Outer signature over the ciphertext (provenance for custodians)      │
//! │  • Verify key: 32 bytes, distributed as hex                             │
//! │                                                                         │
//! │  EncryptionKeyPair (X25519)                                             │
//! │  • Key agreement between origin and destination                         │
//! │  • Private key: 32 bytes (zeroized on drop)                             │
//! │                                                                         │
//! │  PublicKeys                                                             │
//! │  • Both public halves, safe to copy to every node                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self { secret }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the secret key bytes (for storage)
    ///
    /// Never log or transmit these bytes.
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the verify key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// X25519 encryption keypair for key agreement
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for storage)
    ///
    /// Never log or transmit these bytes.
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// origin_secret × destination_public == destination_secret × origin_public
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        self.secret.diffie_hellman(&their_public).to_bytes()
    }
}

/// Public key material for one node
///
/// Contains only public information and can be serialized, copied to other
/// nodes and stored without security concerns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeys {
    /// X25519 public key (32 bytes)
    #[serde(with = "hex_bytes")]
    pub encryption: [u8; 32],

    /// Ed25519 verify key (32 bytes)
    #[serde(with = "hex_bytes")]
    pub verify: [u8; 32],
}

impl PublicKeys {
    /// Create from raw bytes
    pub fn from_bytes(encryption: [u8; 32], verify: [u8; 32]) -> Self {
        Self { encryption, verify }
    }

    /// Parse the verify key, rejecting points that are not on the curve
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.verify)
            .map_err(|e| Error::InvalidKey(format!("Invalid verify key: {}", e)))
    }

    /// Verify key as hex, the form handed to custodians
    pub fn verify_key_hex(&self) -> String {
        hex::encode(self.verify)
    }

    /// Encode as hex string (encryption key then verify key)
    pub fn to_hex(&self) -> String {
        format!("{}{}", hex::encode(self.encryption), hex::encode(self.verify))
    }

    /// Decode from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != 128 {
            return Err(Error::InvalidKey("Public key hex must be 128 characters".into()));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::InvalidKey(format!("Invalid hex: {}", e)))?;

        let encryption: [u8; 32] = bytes[0..32]
            .try_into()
            .map_err(|_| Error::InvalidKey("Invalid encryption key length".into()))?;

        let verify: [u8; 32] = bytes[32..64]
            .try_into()
            .map_err(|_| Error::InvalidKey("Invalid verify key length".into()))?;

        Ok(Self { encryption, verify })
    }
}

/// Serde helper for serializing byte arrays as hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let a = SigningKeyPair::generate();
        let b = SigningKeyPair::generate();
        assert_ne!(a.public_bytes(), b.public_bytes());

        let a = EncryptionKeyPair::generate();
        let b = EncryptionKeyPair::generate();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn test_keypair_from_bytes_is_stable() {
        let signing = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_bytes(&signing.secret_bytes());
        assert_eq!(signing.public_bytes(), restored.public_bytes());

        let encryption = EncryptionKeyPair::generate();
        let restored = EncryptionKeyPair::from_bytes(&encryption.secret_bytes());
        assert_eq!(encryption.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn test_diffie_hellman() {
        let origin = EncryptionKeyPair::generate();
        let destination = EncryptionKeyPair::generate();

        let origin_shared = origin.diffie_hellman(&destination.public_bytes());
        let destination_shared = destination.diffie_hellman(&origin.public_bytes());

        assert_eq!(origin_shared, destination_shared);
    }

    #[test]
    fn test_public_keys_json() {
        let keys = PublicKeys::from_bytes(
            EncryptionKeyPair::generate().public_bytes(),
            SigningKeyPair::generate().public_bytes(),
        );

        let json = serde_json::to_string(&keys).unwrap();
        assert!(json.contains(&keys.verify_key_hex()));

        let restored: PublicKeys = serde_json::from_str(&json).unwrap();
        assert_eq!(keys, restored);
    }

    #[test]
    fn test_public_keys_hex() {
        let keys = PublicKeys::from_bytes([7u8; 32], SigningKeyPair::generate().public_bytes());
        let restored = PublicKeys::from_hex(&keys.to_hex()).unwrap();
        assert_eq!(keys, restored);
        assert!(restored.verifying_key().is_ok());

        assert!(PublicKeys::from_hex("abcd").is_err());
    }
}
