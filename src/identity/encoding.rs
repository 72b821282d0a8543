//! Versioned key record encoding.
//!
//! Each key file holds one or more lines of the form
//!
//! ```text
//! endrun-key:v1:<kind>:<hex>
//! ```
//!
//! The kind tag says what the bytes are, so a public file can never be
//! mistaken for a private one and a future format can be introduced by
//! bumping the version.

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Prefix shared by every encoded key record
pub const KEY_ENCODING_PREFIX: &str = "endrun-key";

/// Current key record version
pub const KEY_ENCODING_VERSION: u8 = 1;

/// What a key record contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// X25519 public key
    X25519Public,
    /// X25519 static secret
    X25519Secret,
    /// Ed25519 verify key
    Ed25519Verify,
    /// Ed25519 signing key seed
    Ed25519Signing,
}

impl KeyKind {
    /// Tag used in the text encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::X25519Public => "x25519-public",
            KeyKind::X25519Secret => "x25519-secret",
            KeyKind::Ed25519Verify => "ed25519-verify",
            KeyKind::Ed25519Signing => "ed25519-signing",
        }
    }

    /// Parse a tag
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "x25519-public" => Ok(KeyKind::X25519Public),
            "x25519-secret" => Ok(KeyKind::X25519Secret),
            "ed25519-verify" => Ok(KeyKind::Ed25519Verify),
            "ed25519-signing" => Ok(KeyKind::Ed25519Signing),
            other => Err(Error::InvalidKey(format!("Unknown key kind: {}", other))),
        }
    }

    /// Whether records of this kind must never leave the owning node
    pub fn is_secret(&self) -> bool {
        matches!(self, KeyKind::X25519Secret | KeyKind::Ed25519Signing)
    }
}

/// One typed key, 32 raw bytes
#[derive(Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Format version
    pub version: u8,
    /// What the bytes are
    pub kind: KeyKind,
    /// Raw key bytes
    pub bytes: [u8; 32],
}

impl KeyRecord {
    /// Create a record at the current version
    pub fn new(kind: KeyKind, bytes: [u8; 32]) -> Self {
        Self {
            version: KEY_ENCODING_VERSION,
            kind,
            bytes,
        }
    }

    /// Encode as a single text line (no trailing newline)
    pub fn encode(&self) -> String {
        format!(
            "{}:v{}:{}:{}",
            KEY_ENCODING_PREFIX,
            self.version,
            self.kind.as_str(),
            hex::encode(self.bytes)
        )
    }

    /// Decode a single text line
    pub fn decode(line: &str) -> Result<Self> {
        let mut parts = line.trim().splitn(4, ':');

        let prefix = parts.next().unwrap_or_default();
        if prefix != KEY_ENCODING_PREFIX {
            return Err(Error::InvalidKey("Not an endrun key record".into()));
        }

        let version = parts
            .next()
            .and_then(|v| v.strip_prefix('v'))
            .and_then(|v| v.parse::<u8>().ok())
            .ok_or_else(|| Error::InvalidKey("Missing key record version".into()))?;
        if version != KEY_ENCODING_VERSION {
            return Err(Error::InvalidKey(format!(
                "Unsupported key record version: {}",
                version
            )));
        }

        let kind = KeyKind::parse(parts.next().unwrap_or_default())?;

        let mut raw = hex::decode(parts.next().unwrap_or_default())
            .map_err(|e| Error::InvalidKey(format!("Invalid key hex: {}", e)))?;
        let result = <[u8; 32]>::try_from(raw.as_slice())
            .map_err(|_| Error::InvalidKey(format!("Key must be 32 bytes, got {}", raw.len())));
        raw.zeroize();

        Ok(Self {
            version,
            kind,
            bytes: result?,
        })
    }

    /// Decode a multi-line document, one record per non-empty line
    pub fn decode_all(text: &str) -> Result<Vec<Self>> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::decode)
            .collect()
    }

    /// Pick the record of a given kind out of a decoded document
    pub fn find(records: &[Self], kind: KeyKind) -> Result<[u8; 32]> {
        records
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.bytes)
            .ok_or_else(|| Error::InvalidKey(format!("Missing {} record", kind.as_str())))
    }
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("KeyRecord");
        s.field("version", &self.version).field("kind", &self.kind);
        if self.kind.is_secret() {
            s.field("bytes", &"<redacted>");
        } else {
            s.field("bytes", &hex::encode(self.bytes));
        }
        s.finish()
    }
}
