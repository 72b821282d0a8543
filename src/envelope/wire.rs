//! Wire encodings.
//!
//! | Encoding | Use | Framing |
//! |----------|-----|---------|
//! | JSON | interchange, inspection | none, canonical field set |
//! | bincode | removable media | `ERUN` + version byte |
//!
//! Decoding validates node ids so a hand-edited file cannot smuggle path
//! components into a key lookup.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::identity::validate_node_id;

/// Leading bytes of a binary envelope
pub const WIRE_MAGIC: &[u8; 4] = b"ERUN";

/// Binary frame version
pub const WIRE_VERSION: u8 = 1;

/// File extension for saved envelopes
pub const ENVELOPE_FILE_EXTENSION: &str = "endrun";

const HEADER_LEN: usize = WIRE_MAGIC.len() + 1;

impl Envelope {
    /// Encode as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Self =
            serde_json::from_str(json).map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Encode as a framed binary blob
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
        framed.extend_from_slice(WIRE_MAGIC);
        framed.push(WIRE_VERSION);
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    /// Decode a framed binary blob
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..WIRE_MAGIC.len()] != WIRE_MAGIC {
            return Err(Error::MalformedEnvelope("Missing ERUN header".into()));
        }
        let version = bytes[WIRE_MAGIC.len()];
        if version != WIRE_VERSION {
            return Err(Error::MalformedEnvelope(format!(
                "Unsupported wire version: {}",
                version
            )));
        }

        let envelope: Self = bincode::deserialize(&bytes[HEADER_LEN..])
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Write the binary form to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        let mut file = fs::File::create(path)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved envelope");
        Ok(())
    }

    /// Write the binary form to a file that must not already exist
    pub fn save_new(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(path);
            return Err(Error::StorageWriteError(format!("{}: {}", path.display(), e)));
        }

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved envelope");
        Ok(())
    }

    /// Read an envelope written by [`Envelope::save`] or [`Envelope::save_new`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| Error::StorageReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }

    fn validate(&self) -> Result<()> {
        validate_node_id(&self.origin)
            .and_then(|_| validate_node_id(&self.destination))
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        for receipt in &self.custody_chain {
            validate_node_id(receipt.custodian_id())
                .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Nonce;
    use crate::custody::Receipt;
    use chrono::{TimeZone, Utc};

    fn sample() -> Envelope {
        let mut envelope = Envelope {
            origin: "alice".into(),
            destination: "bob".into(),
            nonce: Nonce::from_bytes([3; 24]),
            ttl: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
            payload: vec![0, 1, 2, 254, 255],
            copies_remaining: 4,
            custody_chain: Vec::new(),
        };
        let fingerprint = envelope.fingerprint();
        envelope.push_receipt(Receipt::new(
            "carol",
            Utc.with_ymd_and_hms(2029, 12, 31, 0, 0, 0).unwrap(),
            fingerprint,
        ));
        envelope
    }

    #[test]
    fn test_json_shape() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["origin"], "alice");
        assert_eq!(value["destination"], "bob");
        assert_eq!(value["nonce"], "AwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMD");
        assert_eq!(value["payload"], "AAEC/v8=");
        assert_eq!(value["ttl"], "2030-01-02T03:04:05Z");
        assert_eq!(value["copies_remaining"], 4);
        assert_eq!(value["custody_chain"][0]["custodian_id"], "carol");
        assert_eq!(
            value["custody_chain"][0]["fingerprint"],
            sample().fingerprint().to_hex()
        );
    }

    #[test]
    fn test_json_and_binary_decode_losslessly() {
        let envelope = sample();
        assert_eq!(Envelope::from_json(&envelope.to_json().unwrap()).unwrap(), envelope);
        assert_eq!(Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap(), envelope);
    }

    #[test]
    fn test_binary_header() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"ERUN");
        assert_eq!(bytes[4], WIRE_VERSION);

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 99;
        assert!(matches!(
            Envelope::from_bytes(&wrong_version),
            Err(Error::MalformedEnvelope(_))
        ));

        assert!(Envelope::from_bytes(b"ER").is_err());
        assert!(Envelope::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_rejects_short_nonce() {
        let json = sample()
            .to_json()
            .unwrap()
            .replace("AwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMD", "AwMD");
        assert!(matches!(Envelope::from_json(&json), Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_rejects_path_like_node_ids() {
        let json = sample().to_json().unwrap().replace("\"bob\"", "\"../bob\"");
        assert!(matches!(Envelope::from_json(&json), Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("bundle.{}", ENVELOPE_FILE_EXTENSION));

        let envelope = sample();
        envelope.save(&path).unwrap();
        assert_eq!(Envelope::load(&path).unwrap(), envelope);

        assert!(matches!(
            Envelope::load(dir.path().join("missing.endrun")),
            Err(Error::StorageReadError(_))
        ));
    }

    #[test]
    fn test_save_new_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("bundle.{}", ENVELOPE_FILE_EXTENSION));

        let first = sample();
        first.save_new(&path).unwrap();

        let mut second = sample();
        second.copies_remaining = 1;
        assert!(matches!(second.save_new(&path), Err(Error::StorageWriteError(_))));
        assert_eq!(Envelope::load(&path).unwrap(), first);
    }
}
