//! Node configuration.
//!
//! Read once at startup and passed into constructors.
//!
//! ```toml
//! node_id = "carol"
//! default_ttl_secs = 86400
//! default_copies = 10
//! key_dir = "/media/usb/keys"
//! neighbours = ["dave", "erin"]
//! receipt_db = "/var/lib/endrun/receipts.db"
//! # storage_key = "<64 hex chars>"
//! handoff_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::crypto::KEY_SIZE;
use crate::error::{Error, Result};
use crate::identity::validate_node_id;
use crate::storage::{MemoryReceiptLog, ReceiptLog, SqliteReceiptLog};

/// Default envelope lifetime (24 hours)
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// Default copy budget
pub const DEFAULT_COPIES: u32 = 10;

/// Default carrier hand-off timeout
pub const DEFAULT_HANDOFF_TIMEOUT_SECS: u64 = 30;

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_copies() -> u32 {
    DEFAULT_COPIES
}

fn default_handoff_timeout_secs() -> u64 {
    DEFAULT_HANDOFF_TIMEOUT_SECS
}

/// Configuration for one node
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// This node's id
    pub node_id: String,

    /// Lifetime given to envelopes wrapped here
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Copy budget given to envelopes wrapped here
    #[serde(default = "default_copies")]
    pub default_copies: u32,

    /// Key directory (in-memory key store if unset)
    #[serde(default)]
    pub key_dir: Option<PathBuf>,

    /// Nodes this node hands copies to
    #[serde(default)]
    pub neighbours: Vec<String>,

    /// Receipt database (in-memory log if unset)
    #[serde(default)]
    pub receipt_db: Option<PathBuf>,

    /// Hex AES-256 key sealing private key files at rest
    #[serde(default)]
    pub storage_key: Option<String>,

    /// Seconds a single carrier hand-off may take
    #[serde(default = "default_handoff_timeout_secs")]
    pub handoff_timeout_secs: u64,
}

impl NodeConfig {
    /// Defaults for a node id
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            default_copies: DEFAULT_COPIES,
            key_dir: None,
            neighbours: Vec::new(),
            receipt_db: None,
            storage_key: None,
            handoff_timeout_secs: DEFAULT_HANDOFF_TIMEOUT_SECS,
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;

        tracing::info!(
            path = %path.display(),
            node_id = %config.node_id,
            neighbours = config.neighbours.len(),
            "Loaded node configuration"
        );
        Ok(config)
    }

    /// Check every field
    pub fn validate(&self) -> Result<()> {
        validate_node_id(&self.node_id)
            .map_err(|e| Error::InvalidConfig(format!("node_id: {}", e)))?;

        if self.default_ttl_secs == 0 {
            return Err(Error::InvalidConfig("default_ttl_secs must be positive".into()));
        }
        if self.ttl_duration().is_none() {
            return Err(Error::InvalidConfig("default_ttl_secs is too large".into()));
        }
        if self.handoff_timeout_secs == 0 {
            return Err(Error::InvalidConfig("handoff_timeout_secs must be positive".into()));
        }

        for neighbour in &self.neighbours {
            validate_node_id(neighbour)
                .map_err(|e| Error::InvalidConfig(format!("neighbours: {}", e)))?;
            if *neighbour == self.node_id {
                return Err(Error::InvalidConfig(format!(
                    "Node {} lists itself as a neighbour",
                    self.node_id
                )));
            }
        }

        self.storage_key_bytes()?;
        Ok(())
    }

    /// Default lifetime as a duration
    pub fn default_ttl(&self) -> Duration {
        self.ttl_duration()
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TTL_SECS as i64))
    }

    fn ttl_duration(&self) -> Option<Duration> {
        i64::try_from(self.default_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
    }

    /// Hand-off timeout as a duration
    pub fn handoff_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.handoff_timeout_secs)
    }

    /// Decoded storage key, if configured
    pub fn storage_key_bytes(&self) -> Result<Option<[u8; KEY_SIZE]>> {
        let Some(hex_key) = &self.storage_key else {
            return Ok(None);
        };
        let bytes = hex::decode(hex_key)
            .map_err(|e| Error::InvalidConfig(format!("storage_key: {}", e)))?;
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidConfig(format!("storage_key must be {} bytes", KEY_SIZE))
        })?;
        Ok(Some(key))
    }

    /// Open the configured receipt log
    pub fn open_receipt_log(&self) -> Result<Arc<dyn ReceiptLog>> {
        Ok(match &self.receipt_db {
            Some(path) => Arc::new(SqliteReceiptLog::open(Some(path.as_path()))?),
            None => Arc::new(MemoryReceiptLog::new()),
        })
    }
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("node_id", &self.node_id)
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("default_copies", &self.default_copies)
            .field("key_dir", &self.key_dir)
            .field("neighbours", &self.neighbours)
            .field("receipt_db", &self.receipt_db)
            .field("storage_key", &self.storage_key.as_ref().map(|_| "<redacted>"))
            .field("handoff_timeout_secs", &self.handoff_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str(r#"node_id = "carol""#).unwrap();

        assert_eq!(config, NodeConfig::new("carol"));
        assert_eq!(config.default_ttl(), Duration::hours(24));
        assert_eq!(config.default_copies, 10);
        assert_eq!(config.handoff_timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_full_toml() {
        let config = NodeConfig::from_toml_str(&format!(
            r#"
            node_id = "carol"
            default_ttl_secs = 3600
            default_copies = 2
            key_dir = "/tmp/keys"
            neighbours = ["dave", "erin"]
            receipt_db = "/tmp/receipts.db"
            storage_key = "{}"
            handoff_timeout_secs = 5
            "#,
            "11".repeat(32)
        ))
        .unwrap();

        assert_eq!(config.default_ttl(), Duration::hours(1));
        assert_eq!(config.default_copies, 2);
        assert_eq!(config.key_dir.as_deref(), Some(Path::new("/tmp/keys")));
        assert_eq!(config.neighbours, vec!["dave", "erin"]);
        assert_eq!(config.storage_key_bytes().unwrap(), Some([0x11; 32]));
    }

    #[test]
    fn test_validation_failures() {
        let bad = [
            r#"node_id = """#,
            r#"node_id = "../x""#,
            "node_id = \"a\"\ndefault_ttl_secs = 0",
            "node_id = \"a\"\nhandoff_timeout_secs = 0",
            "node_id = \"a\"\nneighbours = [\"a\"]",
            "node_id = \"a\"\nstorage_key = \"abcd\"",
            "default_copies = 3",
        ];
        for text in bad {
            assert!(
                matches!(NodeConfig::from_toml_str(text), Err(Error::InvalidConfig(_))),
                "accepted: {}",
                text
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "node_id = \"dave\"\ndefault_copies = 4\n").unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.node_id, "dave");
        assert_eq!(config.default_copies, 4);

        assert!(NodeConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_debug_redacts_storage_key() {
        let mut config = NodeConfig::new("carol");
        config.storage_key = Some("ab".repeat(32));
        assert!(!format!("{:?}", config).contains("abab"));
    }
}
