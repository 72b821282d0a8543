//! # Key Store
//!
//! Resolves node ids to key material.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY STORE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  generate_identity("alice")                                             │
//! │      │                                                                  │
//! │      ├──► alice.private   x25519-secret + ed25519-signing               │
//! │      │                    (optionally AES-256-GCM sealed, aad = id)     │
//! │      └──► alice.public    x25519-public + ed25519-verify                │
//! │                                                                         │
//! │  import_public("bob", keys)   ──► bob.public                           │
//! │                                                                         │
//! │  lookup_public(id)   ──► PublicKeys   (any provisioned node)            │
//! │  lookup_private(id)  ──► NodeIdentity (only the node's own id)          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A deployed node's key directory holds its own private file and every
//! peer's public file. Nothing here prevents a test from holding several
//! private files in one store; that separation is a provisioning concern.

mod backend;

pub use backend::{DirKeyBackend, KeyBackend, KeyClass, MemoryKeyBackend};

use std::path::Path;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::config::NodeConfig;
use crate::crypto::{
    open_at_rest, seal_at_rest, EncryptionKeyPair, PublicKeys, SigningKeyPair, KEY_SIZE,
};
use crate::error::{Error, Result};
use crate::identity::{
    validate_node_id, KeyKind, KeyRecord, NodeIdentity, PublicIdentity, KEY_ENCODING_PREFIX,
};

/// Per-node key material lookup and provisioning
#[derive(Clone)]
pub struct KeyStore {
    backend: Arc<dyn KeyBackend>,
    storage_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
}

impl KeyStore {
    /// Create a key store over any backend
    pub fn new(backend: impl KeyBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            storage_key: None,
        }
    }

    /// Create an in-memory key store
    pub fn in_memory() -> Self {
        Self::new(MemoryKeyBackend::new())
    }

    /// Open a directory-backed key store
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(DirKeyBackend::open(dir)?))
    }

    /// Build the key store a node's configuration describes
    ///
    /// Uses the configured key directory (in-memory if none) and storage key.
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let store = match &config.key_dir {
            Some(dir) => Self::open_dir(dir)?,
            None => Self::in_memory(),
        };
        Ok(match config.storage_key_bytes()? {
            Some(key) => store.with_storage_key(key),
            None => store,
        })
    }

    /// Seal private key documents at rest under this key
    pub fn with_storage_key(mut self, key: [u8; KEY_SIZE]) -> Self {
        self.storage_key = Some(Zeroizing::new(key));
        self
    }

    /// Generate and persist a fresh identity
    ///
    /// Fails with `DuplicateIdentity` if any material already exists for
    /// `node_id`, including an imported public file.
    pub fn generate_identity(&self, node_id: &str) -> Result<NodeIdentity> {
        validate_node_id(node_id)?;
        if self.has_identity(node_id)? {
            return Err(Error::DuplicateIdentity(node_id.to_string()));
        }

        let identity = NodeIdentity::generate(node_id)?;
        self.backend
            .write_new(node_id, KeyClass::Private, &self.encode_private(&identity)?)?;
        if let Err(e) = self.backend.write_new(
            node_id,
            KeyClass::Public,
            encode_public(&identity.public_keys()).as_bytes(),
        ) {
            // Roll back so the id can be provisioned again
            if let Err(cleanup) = self.backend.remove(node_id, KeyClass::Private) {
                tracing::error!(node_id = node_id, error = %cleanup, "Orphaned private key file");
            }
            return Err(e);
        }

        tracing::info!(
            node_id = node_id,
            verify_key = %identity.public_keys().verify_key_hex(),
            sealed = self.storage_key.is_some(),
            "Generated node identity"
        );
        Ok(identity)
    }

    /// Public keys for a node
    pub fn lookup_public(&self, node_id: &str) -> Result<PublicKeys> {
        let document = self
            .backend
            .read(node_id, KeyClass::Public)?
            .ok_or_else(|| Error::UnknownNode(node_id.to_string()))?;

        let text = std::str::from_utf8(&document)
            .map_err(|_| Error::InvalidKey(format!("Public key file for {} is not text", node_id)))?;
        let records = KeyRecord::decode_all(text)?;

        let keys = PublicKeys::from_bytes(
            KeyRecord::find(&records, KeyKind::X25519Public)?,
            KeyRecord::find(&records, KeyKind::Ed25519Verify)?,
        );
        keys.verifying_key()?;
        Ok(keys)
    }

    /// Private identity for a node
    ///
    /// Fails with `UnknownNode` when this store holds no private material
    /// for `node_id`, which is the normal case for every node but our own.
    pub fn lookup_private(&self, node_id: &str) -> Result<NodeIdentity> {
        let document = self
            .backend
            .read(node_id, KeyClass::Private)?
            .ok_or_else(|| Error::UnknownNode(node_id.to_string()))?;

        let plaintext = self.open_private(node_id, &document)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::InvalidKey(format!("Private key file for {} is not text", node_id)))?;
        let records = KeyRecord::decode_all(text)?;

        let identity = NodeIdentity::from_parts(
            node_id,
            SigningKeyPair::from_bytes(&KeyRecord::find(&records, KeyKind::Ed25519Signing)?),
            EncryptionKeyPair::from_bytes(&KeyRecord::find(&records, KeyKind::X25519Secret)?),
        )?;

        if let Some(stored) = self.backend.read(node_id, KeyClass::Public)? {
            let expected = encode_public(&identity.public_keys());
            if stored.as_slice() != expected.as_bytes() {
                return Err(Error::InvalidKey(format!(
                    "Public key file for {} does not match its private keys",
                    node_id
                )));
            }
        }

        Ok(identity)
    }

    /// Install a peer's public keys
    ///
    /// Re-importing identical keys is a no-op; different keys for a known
    /// node fail with `DuplicateIdentity`.
    pub fn import_public(&self, node_id: &str, keys: &PublicKeys) -> Result<()> {
        validate_node_id(node_id)?;
        keys.verifying_key()?;

        if self.backend.exists(node_id, KeyClass::Public)? {
            if self.lookup_public(node_id)? == *keys {
                tracing::debug!(node_id = node_id, "Public keys already imported");
                return Ok(());
            }
            tracing::warn!(node_id = node_id, "Refusing to replace public keys");
            return Err(Error::DuplicateIdentity(node_id.to_string()));
        }

        self.backend
            .write_new(node_id, KeyClass::Public, encode_public(keys).as_bytes())?;
        tracing::info!(
            node_id = node_id,
            verify_key = %keys.verify_key_hex(),
            "Imported peer public keys"
        );
        Ok(())
    }

    /// Import a public identity document
    pub fn import_identity(&self, identity: &PublicIdentity) -> Result<()> {
        self.import_public(&identity.node_id, &identity.keys)
    }

    /// A node's public material as a portable document
    pub fn export_public(&self, node_id: &str) -> Result<PublicIdentity> {
        Ok(PublicIdentity {
            node_id: node_id.to_string(),
            keys: self.lookup_public(node_id)?,
        })
    }

    /// Whether any key material is held for a node
    pub fn has_identity(&self, node_id: &str) -> Result<bool> {
        Ok(self.backend.exists(node_id, KeyClass::Public)?
            || self.backend.exists(node_id, KeyClass::Private)?)
    }

    /// Every node whose public keys are installed
    pub fn known_nodes(&self) -> Result<Vec<String>> {
        self.backend.list(KeyClass::Public)
    }

    // ========================================================================
    // ENCODING
    // ========================================================================

    fn encode_private(&self, identity: &NodeIdentity) -> Result<Zeroizing<Vec<u8>>> {
        let text = Zeroizing::new(format!(
            "{}\n{}\n",
            KeyRecord::new(KeyKind::X25519Secret, identity.encryption().secret_bytes()).encode(),
            KeyRecord::new(KeyKind::Ed25519Signing, identity.signing().secret_bytes()).encode(),
        ));

        match &self.storage_key {
            Some(key) => Ok(Zeroizing::new(seal_at_rest(
                key,
                text.as_bytes(),
                identity.node_id().as_bytes(),
            )?)),
            None => Ok(Zeroizing::new(text.as_bytes().to_vec())),
        }
    }

    fn open_private(&self, node_id: &str, document: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if document.starts_with(KEY_ENCODING_PREFIX.as_bytes()) {
            return Ok(Zeroizing::new(document.to_vec()));
        }
        let key = self.storage_key.as_ref().ok_or_else(|| {
            Error::InvalidKey(format!(
                "Private key file for {} is sealed and no storage key is configured",
                node_id
            ))
        })?;
        open_at_rest(key, document, node_id.as_bytes()).map(Zeroizing::new)
    }
}

fn encode_public(keys: &PublicKeys) -> String {
    format!(
        "{}\n{}\n",
        KeyRecord::new(KeyKind::X25519Public, keys.encryption).encode(),
        KeyRecord::new(KeyKind::Ed25519Verify, keys.verify).encode(),
    )
}

// ============================================================================
// TESTS
// ============================================================================
