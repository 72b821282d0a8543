//! Key storage backends.
//!
//! A backend stores opaque key documents, one per node per [`KeyClass`].
//! It never interprets the bytes; encoding and at-rest sealing happen in
//! [`KeyStore`](super::KeyStore).

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::identity::validate_node_id;

/// Which half of a node's key material a document holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// Encryption public key and verify key
    Public,
    /// Encryption secret and signing key
    Private,
}

impl KeyClass {
    /// File extension used by [`DirKeyBackend`]
    pub fn extension(&self) -> &'static str {
        match self {
            KeyClass::Public => "public",
            KeyClass::Private => "private",
        }
    }
}

/// Storage for key documents
pub trait KeyBackend: Send + Sync {
    /// Read a document, `None` if absent
    fn read(&self, node_id: &str, class: KeyClass) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Write a document that must not already exist
    ///
    /// Fails with `DuplicateIdentity` if one does.
    fn write_new(&self, node_id: &str, class: KeyClass, data: &[u8]) -> Result<()>;

    /// Whether a document exists
    fn exists(&self, node_id: &str, class: KeyClass) -> Result<bool>;

    /// Node ids that have a document of this class
    fn list(&self, class: KeyClass) -> Result<Vec<String>>;

    /// Delete a document; absent documents are not an error
    fn remove(&self, node_id: &str, class: KeyClass) -> Result<()>;
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// In-memory backend for tests and simulations
#[derive(Default)]
pub struct MemoryKeyBackend {
    documents: RwLock<HashMap<(String, KeyClass), Zeroizing<Vec<u8>>>>,
}

impl MemoryKeyBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyBackend for MemoryKeyBackend {
    fn read(&self, node_id: &str, class: KeyClass) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let documents = self.documents.read();
        Ok(documents
            .get(&(node_id.to_string(), class))
            .map(|doc| Zeroizing::new(doc.to_vec())))
    }

    fn write_new(&self, node_id: &str, class: KeyClass, data: &[u8]) -> Result<()> {
        let mut documents = self.documents.write();
        let key = (node_id.to_string(), class);
        if documents.contains_key(&key) {
            return Err(Error::DuplicateIdentity(node_id.to_string()));
        }
        documents.insert(key, Zeroizing::new(data.to_vec()));
        Ok(())
    }

    fn exists(&self, node_id: &str, class: KeyClass) -> Result<bool> {
        Ok(self.documents.read().contains_key(&(node_id.to_string(), class)))
    }

    fn list(&self, class: KeyClass) -> Result<Vec<String>> {
        let documents = self.documents.read();
        let mut nodes: Vec<String> = documents
            .keys()
            .filter(|(_, c)| *c == class)
            .map(|(node, _)| node.clone())
            .collect();
        nodes.sort();
        Ok(nodes)
    }

    fn remove(&self, node_id: &str, class: KeyClass) -> Result<()> {
        self.documents.write().remove(&(node_id.to_string(), class));
        Ok(())
    }
}

// ============================================================================
// DIRECTORY BACKEND
// ============================================================================

/// One file per node per class: `<dir>/<node_id>.public`, `<dir>/<node_id>.private`
///
/// Private files are created with mode `0600` on Unix.
pub struct DirKeyBackend {
    dir: PathBuf,
}

impl DirKeyBackend {
    /// Open (and create if needed) a key directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageWriteError(format!("Cannot create key directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// The key directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, node_id: &str, class: KeyClass) -> Result<PathBuf> {
        validate_node_id(node_id)?;
        Ok(self.dir.join(format!("{}.{}", node_id, class.extension())))
    }
}

impl KeyBackend for DirKeyBackend {
    fn read(&self, node_id: &str, class: KeyClass) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let path = self.path_for(node_id, class)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(Zeroizing::new(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageReadError(format!("{}: {}", path.display(), e))),
        }
    }

    fn write_new(&self, node_id: &str, class: KeyClass, data: &[u8]) -> Result<()> {
        let path = self.path_for(node_id, class)?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if class == KeyClass::Private {
                options.mode(0o600);
            }
        }

        let mut file = match options.open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateIdentity(node_id.to_string()));
            }
            Err(e) => {
                return Err(Error::StorageWriteError(format!("{}: {}", path.display(), e)));
            }
        };

        if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
            drop(file);
            // No truncated document left behind
            let _ = fs::remove_file(&path);
            return Err(Error::StorageWriteError(format!("{}: {}", path.display(), e)));
        }
        Ok(())
    }

    fn exists(&self, node_id: &str, class: KeyClass) -> Result<bool> {
        Ok(self.path_for(node_id, class)?.is_file())
    }

    fn list(&self, class: KeyClass) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::StorageReadError(format!("{}: {}", self.dir.display(), e)))?;

        let mut nodes = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::StorageReadError(format!("{}: {}", self.dir.display(), e)))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(class.extension()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_node_id(stem).is_ok() {
                    nodes.push(stem.to_string());
                }
            }
        }
        nodes.sort();
        Ok(nodes)
    }

    fn remove(&self, node_id: &str, class: KeyClass) -> Result<()> {
        let path = self.path_for(node_id, class)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorageWriteError(format!("{}: {}", path.display(), e))),
        }
    }
}
