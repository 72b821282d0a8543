//! # Envelope Module
//!
//! The unit that travels between nodes.
//!
//! ## Envelope Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ENVELOPE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  origin            "alice"        ┐                                     │
//! │  destination       "bob"          │ bound into the box as               │
//! │  ttl               2024-06-01T…Z  ┘ associated data                     │
//! │                                                                         │
//! │  nonce             24 random bytes (fresh per wrap)                     │
//! │  payload           outer_sig || box(inner_sig || blob)                  │
//! │                                                                         │
//! │  copies_remaining  10 → 9 → 8 …   (never increases)                     │
//! │  custody_chain     [receipt, receipt, …]   (append-only)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fields are readable by anyone through accessors. Only the custody
//! ledger and the forwarding policy inside this crate mutate an envelope,
//! and only in the two directions above.

mod service;
mod wire;

pub use service::EnvelopeService;
pub use wire::{ENVELOPE_FILE_EXTENSION, WIRE_MAGIC, WIRE_VERSION};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{Fingerprint, Nonce};
use crate::custody::Receipt;

/// A sign-encrypt-sign transport unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub(crate) origin: String,
    pub(crate) destination: String,
    #[serde(with = "nonce_serde")]
    pub(crate) nonce: Nonce,
    pub(crate) ttl: DateTime<Utc>,
    #[serde(with = "payload_serde")]
    pub(crate) payload: Vec<u8>,
    pub(crate) copies_remaining: u32,
    pub(crate) custody_chain: Vec<Receipt>,
}

impl Envelope {
    /// Node that wrapped the envelope
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Node that can unwrap it
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Box nonce
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Absolute expiry instant
    pub fn ttl(&self) -> DateTime<Utc> {
        self.ttl
    }

    /// Whether the envelope has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.ttl
    }

    /// Signed ciphertext
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Remaining copy budget
    pub fn copies_remaining(&self) -> u32 {
        self.copies_remaining
    }

    /// Receipts in hop order
    pub fn custody_chain(&self) -> &[Receipt] {
        &self.custody_chain
    }

    /// Whether a node has already handled this envelope
    pub fn has_custodian(&self, node_id: &str) -> bool {
        self.custody_chain.iter().any(|r| r.custodian_id() == node_id)
    }

    /// SHA-256 of the payload as it is now
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.payload)
    }

    pub(crate) fn push_receipt(&mut self, receipt: Receipt) {
        self.custody_chain.push(receipt);
    }

    /// Spend one copy, `false` if the budget was already zero
    pub(crate) fn spend_copy(&mut self) -> bool {
        match self.copies_remaining.checked_sub(1) {
            Some(remaining) => {
                self.copies_remaining = remaining;
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================
//
// Human-readable formats (JSON) carry bytes as base64 text; compact formats
// (bincode) carry them raw.

mod payload_serde {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&BASE64.encode(bytes))
        } else {
            bytes.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            BASE64.decode(s).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

mod nonce_serde {
    use serde::{Deserializer, Serializer};

    use crate::crypto::{Nonce, NONCE_SIZE};

    pub fn serialize<S: Serializer>(nonce: &Nonce, serializer: S) -> Result<S::Ok, S::Error> {
        super::payload_serde::serialize(nonce.as_bytes(), serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Nonce, D::Error> {
        let bytes = super::payload_serde::deserialize(deserializer)?;
        let array: [u8; NONCE_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            serde::de::Error::custom(format!("nonce must be {} bytes, got {}", NONCE_SIZE, b.len()))
        })?;
        Ok(Nonce::from_bytes(array))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(copies: u32) -> Envelope {
        Envelope {
            origin: "alice".into(),
            destination: "bob".into(),
            nonce: Nonce::from_bytes([7; 24]),
            ttl: Utc::now() + chrono::Duration::hours(1),
            payload: b"signed ciphertext".to_vec(),
            copies_remaining: copies,
            custody_chain: Vec::new(),
        }
    }

    #[test]
    fn test_spend_copy_stops_at_zero() {
        let mut envelope = sample(1);
        assert!(envelope.spend_copy());
        assert_eq!(envelope.copies_remaining(), 0);
        assert!(!envelope.spend_copy());
        assert_eq!(envelope.copies_remaining(), 0);
    }

    #[test]
    fn test_has_custodian() {
        let mut envelope = sample(3);
        assert!(!envelope.has_custodian("carol"));

        envelope.push_receipt(Receipt::new("carol", Utc::now(), envelope.fingerprint()));
        assert!(envelope.has_custodian("carol"));
        assert!(!envelope.has_custodian("dave"));
    }

    #[test]
    fn test_expiry_boundary() {
        let envelope = sample(1);
        assert!(!envelope.is_expired_at(envelope.ttl()));
        assert!(envelope.is_expired_at(envelope.ttl() + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_fingerprint_tracks_payload() {
        let mut envelope = sample(1);
        let before = envelope.fingerprint();
        assert_eq!(before, Fingerprint::of(b"signed ciphertext"));

        envelope.payload[0] ^= 1;
        assert_ne!(envelope.fingerprint(), before);
    }
}
