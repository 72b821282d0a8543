//! # Identity Module
//!
//! Per-node cryptographic identity.
//!
//! ## Identity Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         NODE IDENTITY                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  node_id: "alice"                                                       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                              │
//! │  │ Signing KeyPair │   │ Encryption      │                              │
//! │  │ (Ed25519)       │   │ KeyPair (X25519)│                              │
//! │  │                 │   │                 │                              │
//! │  │ • Inner sig     │   │ • Box to/from   │                              │
//! │  │ • Outer sig     │   │   one peer      │                              │
//! │  └────────┬────────┘   └────────┬────────┘                              │
//! │           │                     │                                       │
//! │           └──────────┬──────────┘                                       │
//! │                      ▼                                                  │
//! │            PublicIdentity (copied to every node)                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`NodeIdentity`] is created once at provisioning and never changes.
//! It is not `Clone`: the private halves exist only where the
//! key store materialized them, and are zeroized when the value drops.

mod encoding;

pub use encoding::{KeyKind, KeyRecord, KEY_ENCODING_PREFIX, KEY_ENCODING_VERSION};

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionKeyPair, PublicKeys, SigningKeyPair};
use crate::error::{Error, Result};

/// Maximum length of a node id
pub const MAX_NODE_ID_LEN: usize = 128;

/// Check that a node id is usable as a key store name
///
/// Node ids end up in file names and SQL rows, so they are limited to
/// ASCII letters, digits, `-`, `_` and `.`, and may not start with a dot.
pub fn validate_node_id(node_id: &str) -> Result<()> {
    if node_id.is_empty() {
        return Err(Error::InvalidArgument("Node id must not be empty".into()));
    }
    if node_id.len() > MAX_NODE_ID_LEN {
        return Err(Error::InvalidArgument(format!(
            "Node id longer than {} characters",
            MAX_NODE_ID_LEN
        )));
    }
    if node_id.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "Node id may not start with '.': {}",
            node_id
        )));
    }
    let valid = node_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(Error::InvalidArgument(format!(
            "Node id contains unsupported characters: {}",
            node_id
        )));
    }
    Ok(())
}

/// A node's complete identity including private keys
///
/// ## Security
///
/// - Contains private keys - handle with care
/// - Both key pairs zeroize themselves when dropped
/// - Only ever materialized on the node that owns it
pub struct NodeIdentity {
    node_id: String,
    signing: SigningKeyPair,
    encryption: EncryptionKeyPair,
}

impl NodeIdentity {
    /// Generate fresh keypairs for a node
    pub fn generate(node_id: impl Into<String>) -> Result<Self> {
        let node_id = node_id.into();
        validate_node_id(&node_id)?;

        Ok(Self {
            node_id,
            signing: SigningKeyPair::generate(),
            encryption: EncryptionKeyPair::generate(),
        })
    }

    /// Assemble an identity from stored key pairs
    pub fn from_parts(
        node_id: impl Into<String>,
        signing: SigningKeyPair,
        encryption: EncryptionKeyPair,
    ) -> Result<Self> {
        let node_id = node_id.into();
        validate_node_id(&node_id)?;

        Ok(Self {
            node_id,
            signing,
            encryption,
        })
    }

    /// The node id
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Both public halves
    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys::from_bytes(self.encryption.public_bytes(), self.signing.public_bytes())
    }

    /// The public identity (safe to share)
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            node_id: self.node_id.clone(),
            keys: self.public_keys(),
        }
    }

    pub(crate) fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub(crate) fn encryption(&self) -> &EncryptionKeyPair {
        &self.encryption
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id)
            .field("verify_key", &self.public_keys().verify_key_hex())
            .finish_non_exhaustive()
    }
}

/// Public portion of a node identity
///
/// This contains no secret information and is what gets distributed to
/// every other node at provisioning time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicIdentity {
    /// Node id
    pub node_id: String,

    /// Public keys for verification and encryption
    pub keys: PublicKeys,
}

impl PublicIdentity {
    /// Verify a detached signature made by this node
    pub fn verify_signature(
        &self,
        message: &[u8],
        signature: &crate::crypto::Signature,
    ) -> Result<()> {
        crate::crypto::verify(&self.keys.verify, message, signature)
    }

    /// Get the encryption public key for boxing to this node
    pub fn encryption_key(&self) -> &[u8; 32] {
        &self.keys.encryption
    }

    /// Serialize as a JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON document produced by [`PublicIdentity::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        let identity: Self = serde_json::from_str(json)
            .map_err(|e| Error::DeserializationError(e.to_string()))?;
        validate_node_id(&identity.node_id)?;
        identity.keys.verifying_key()?;
        Ok(identity)
    }
}

// ============================================================================
// TESTS
// ============================================================================
