//! Removable-media carrier.
//!
//! Copies are written as `.endrun` files into a directory (a USB stick, a
//! shared folder) and picked up by whichever node mounts it next.
//!
//! File names: `<fingerprint16>-<hops>-<holder>.to-<neighbour>.endrun` for
//! addressed copies, `<fingerprint16>-<hops>-<holder>.carrier.endrun` for
//! unaddressed ones. The holder is the last custodian (the origin before the
//! first hop), so copies of one envelope relayed by different nodes onto the
//! same media never share a name. Files are created exclusively: a name
//! collision fails the hand-off instead of replacing a copy.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::Carrier;
use crate::envelope::{Envelope, ENVELOPE_FILE_EXTENSION};
use crate::error::{Error, Result};

const CARRIER_TAG: &str = "carrier";

/// A directory of envelope files
pub struct DirCarrier {
    dir: PathBuf,
}

impl DirCarrier {
    /// Open (and create if needed) a media directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::TransportFailure(format!("Cannot open media {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// The media directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Take every copy addressed to `node_id` or to no one in particular
    ///
    /// Files are removed once loaded. Files that fail to load are left in
    /// place and logged.
    pub fn collect_for(&self, node_id: &str) -> Result<Vec<Envelope>> {
        let addressed = format!(".to-{}.{}", node_id, ENVELOPE_FILE_EXTENSION);
        let unaddressed = format!(".{}.{}", CARRIER_TAG, ENVELOPE_FILE_EXTENSION);

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::TransportFailure(format!("{}: {}", self.dir.display(), e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::TransportFailure(e.to_string()))?
                .path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(&addressed) || name.ends_with(&unaddressed) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut envelopes = Vec::with_capacity(paths.len());
        for path in paths {
            match Envelope::load(&path) {
                Ok(envelope) => {
                    fs::remove_file(&path).map_err(|e| {
                        Error::TransportFailure(format!("{}: {}", path.display(), e))
                    })?;
                    envelopes.push(envelope);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable envelope file");
                }
            }
        }

        tracing::debug!(node = node_id, count = envelopes.len(), "Collected envelopes from media");
        Ok(envelopes)
    }

    fn file_name(neighbour: Option<&str>, envelope: &Envelope) -> String {
        let fingerprint = envelope.fingerprint().to_hex();
        let holder = envelope
            .custody_chain()
            .last()
            .map(|r| r.custodian_id())
            .unwrap_or_else(|| envelope.origin());
        let target = match neighbour {
            Some(n) => format!("to-{}", n),
            None => CARRIER_TAG.to_string(),
        };
        format!(
            "{}-{}-{}.{}.{}",
            &fingerprint[..16],
            envelope.custody_chain().len(),
            holder,
            target,
            ENVELOPE_FILE_EXTENSION
        )
    }
}

#[async_trait]
impl Carrier for DirCarrier {
    async fn hand_off(&self, neighbour: Option<&str>, envelope: &Envelope) -> Result<()> {
        let path = self.dir.join(Self::file_name(neighbour, envelope));
        envelope
            .save_new(&path)
            .map_err(|e| Error::TransportFailure(e.to_string()))
    }
}
