//! # Digital Signatures Module
//!
//! Ed25519 signatures in attached form: `signature (64 bytes) || message`.
//!
//! An envelope carries two of these. The inner one wraps the blob before
//! encryption, the outer one wraps the ciphertext so that a custodian with
//! only the origin's verify key can check provenance.
//!
//! ```text
//! ┌───────────────────────┬──────────────────────────────────────────┐
//! │  signature (64 bytes) │  message (variable)                      │
//! └───────────────────────┴──────────────────────────────────────────┘
//! ```

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};

use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result, SignatureLayer};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 digital signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = slice.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Sign a message using Ed25519
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature
///
/// Returns `InvalidKey` if the verify key is not a curve point and
/// `SignatureInvalid` if the signature does not match.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid verify key: {}", e)))?;

    let sig = Ed25519Signature::from_bytes(&signature.0);

    verifying_key
        .verify_strict(message, &sig)
        .map_err(|_| Error::SignatureInvalid(SignatureLayer::Detached))
}

/// Sign and prepend the signature to the message
pub fn sign_attached(keypair: &SigningKeyPair, message: &[u8]) -> Vec<u8> {
    let signature = sign(keypair, message);
    let mut signed = Vec::with_capacity(SIGNATURE_SIZE + message.len());
    signed.extend_from_slice(signature.as_bytes());
    signed.extend_from_slice(message);
    signed
}

/// Verify an attached signature and return the message it covers
pub fn open_attached<'a>(public_key: &[u8; 32], signed: &'a [u8]) -> Result<&'a [u8]> {
    if signed.len() < SIGNATURE_SIZE {
        return Err(Error::SignatureInvalid(SignatureLayer::Detached));
    }
    let (sig, message) = signed.split_at(SIGNATURE_SIZE);
    verify(public_key, message, &Signature::from_slice(sig)?)?;
    Ok(message)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = SigningKeyPair::generate();
        let message = b"git bundle bytes";

        let signature = sign(&keypair, message);
        assert!(verify(&keypair.public_bytes(), message, &signature).is_ok());
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let keypair1 = SigningKeyPair::generate();
        let keypair2 = SigningKeyPair::generate();

        let signature = sign(&keypair1, b"bundle");
        let result = verify(&keypair2.public_bytes(), b"bundle", &signature);

        assert!(matches!(result, Err(Error::SignatureInvalid(_))));
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = SigningKeyPair::generate();
        assert_eq!(sign(&keypair, b"x"), sign(&keypair, b"x"));
    }

    #[test]
    fn test_attached_round_trip() {
        let keypair = SigningKeyPair::generate();
        let signed = sign_attached(&keypair, b"hello");

        assert_eq!(signed.len(), SIGNATURE_SIZE + 5);
        let message = open_attached(&keypair.public_bytes(), &signed).unwrap();
        assert_eq!(message, b"hello");
    }

    #[test]
    fn test_attached_tampered_message_fails() {
        let keypair = SigningKeyPair::generate();
        let mut signed = sign_attached(&keypair, b"hello");
        let last = signed.len() - 1;
        signed[last] ^= 0x01;

        let result = open_attached(&keypair.public_bytes(), &signed);
        assert!(matches!(result, Err(Error::SignatureInvalid(SignatureLayer::Detached))));
    }

    #[test]
    fn test_attached_too_short_fails() {
        let keypair = SigningKeyPair::generate();
        let result = open_attached(&keypair.public_bytes(), &[0u8; 10]);
        assert!(matches!(result, Err(Error::SignatureInvalid(_))));
    }
}
