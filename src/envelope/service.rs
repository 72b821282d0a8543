//! Wrap and unwrap.
//!
//! ## Wrap (at the origin)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Step 1: nonce = 24 bytes from the OS RNG                               │
//! │  Step 2: signed_blob = sig_origin(blob) || blob                         │
//! │  Step 3: ciphertext  = box(origin_x25519, destination_x25519, nonce,    │
//! │                            signed_blob, aad(origin, destination, ttl))  │
//! │  Step 4: payload     = sig_origin(ciphertext) || ciphertext             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Unwrap (at the destination)
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. destination matches the local node (`DestinationMismatch`)
//! 2. ttl has not passed (`Expired`)
//! 3. outer signature (`SignatureInvalid(Outer)`), before any decryption
//! 4. box opens (`DecryptionFailed`)
//! 5. inner signature (`SignatureInvalid(Inner)`)

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::config::NodeConfig;
use crate::crypto::{open_attached, open_box, seal_box, sign_attached, Nonce, PublicKeys};
use crate::envelope::Envelope;
use crate::error::{Error, Result, SignatureLayer};
use crate::identity::{NodeIdentity, PublicIdentity};
use crate::keystore::KeyStore;
use crate::time::{Clock, SystemClock};

/// Domain separator for the box associated data
const AAD_CONTEXT: &[u8] = b"endrun-envelope-v1";

/// Builds and opens envelopes
pub struct EnvelopeService {
    keystore: KeyStore,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    default_copies: u32,
}

impl EnvelopeService {
    /// Create a service with the node's defaults
    pub fn new(keystore: KeyStore, config: &NodeConfig) -> Self {
        Self {
            keystore,
            clock: Arc::new(SystemClock),
            default_ttl: config.default_ttl(),
            default_copies: config.default_copies,
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The key store this service resolves origins through
    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// Wrap a blob for one destination
    ///
    /// `ttl` is relative to now and must be positive. The resulting expiry
    /// is truncated to whole milliseconds so it survives every encoding
    /// exactly.
    pub fn wrap(
        &self,
        blob: &[u8],
        origin: &NodeIdentity,
        destination: &PublicIdentity,
        ttl: Duration,
        copies: u32,
    ) -> Result<Envelope> {
        if ttl <= Duration::zero() {
            return Err(Error::InvalidArgument(format!(
                "TTL must be positive, got {}",
                ttl
            )));
        }
        destination
            .keys
            .verifying_key()
            .map_err(|_| Error::KeyLookupError(destination.node_id.clone()))?;

        let expires = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::InvalidArgument(format!("TTL {} overflows", ttl)))?
            .trunc_subsecs(3);

        let nonce = Nonce::random();
        let aad = build_aad(origin.node_id(), &destination.node_id, expires);

        let signed_blob = sign_attached(origin.signing(), blob);
        let ciphertext = seal_box(
            origin.encryption(),
            destination.encryption_key(),
            &nonce,
            &signed_blob,
            &aad,
        )?;
        let payload = sign_attached(origin.signing(), &ciphertext);

        tracing::debug!(
            origin = origin.node_id(),
            destination = %destination.node_id,
            blob_len = blob.len(),
            payload_len = payload.len(),
            ttl = %expires,
            copies = copies,
            "Wrapped envelope"
        );

        Ok(Envelope {
            origin: origin.node_id().to_string(),
            destination: destination.node_id.clone(),
            nonce,
            ttl: expires,
            payload,
            copies_remaining: copies,
            custody_chain: Vec::new(),
        })
    }

    /// Wrap for a destination resolved through the key store, with the
    /// configured ttl and copy budget
    pub fn wrap_for(
        &self,
        blob: &[u8],
        origin: &NodeIdentity,
        destination_id: &str,
    ) -> Result<Envelope> {
        let destination = PublicIdentity {
            node_id: destination_id.to_string(),
            keys: self.resolve(destination_id)?,
        };
        self.wrap(blob, origin, &destination, self.default_ttl, self.default_copies)
    }

    /// Verify and decrypt an envelope addressed to `destination`
    pub fn unwrap(&self, envelope: &Envelope, destination: &NodeIdentity) -> Result<Vec<u8>> {
        if envelope.destination != destination.node_id() {
            return Err(Error::DestinationMismatch {
                expected: envelope.destination.clone(),
                actual: destination.node_id().to_string(),
            });
        }

        if envelope.is_expired_at(self.clock.now()) {
            return Err(Error::Expired(envelope.ttl));
        }

        let origin = self.resolve(&envelope.origin)?;
        let ciphertext = self.open_outer(envelope, &origin)?;

        let aad = build_aad(&envelope.origin, &envelope.destination, envelope.ttl);
        let signed_blob = open_box(
            destination.encryption(),
            &origin.encryption,
            &envelope.nonce,
            ciphertext,
            &aad,
        )
        .map_err(|e| {
            tracing::warn!(origin = %envelope.origin, error = %e, "Envelope failed to decrypt");
            e
        })?;

        let blob = open_attached(&origin.verify, &signed_blob).map_err(|e| {
            tracing::warn!(origin = %envelope.origin, "Inner signature rejected");
            e.at_layer(SignatureLayer::Inner)
        })?;

        tracing::debug!(
            origin = %envelope.origin,
            destination = %envelope.destination,
            blob_len = blob.len(),
            hops = envelope.custody_chain.len(),
            "Unwrapped envelope"
        );
        Ok(blob.to_vec())
    }

    /// Check the outer signature only
    ///
    /// Any custodian holding the origin's verify key can run this; it says
    /// nothing about the contents.
    pub fn verify_provenance(&self, envelope: &Envelope) -> Result<()> {
        let origin = self.resolve(&envelope.origin)?;
        self.open_outer(envelope, &origin).map(|_| ())
    }

    fn open_outer<'a>(&self, envelope: &'a Envelope, origin: &PublicKeys) -> Result<&'a [u8]> {
        open_attached(&origin.verify, &envelope.payload).map_err(|e| {
            tracing::warn!(origin = %envelope.origin, "Outer signature rejected");
            e.at_layer(SignatureLayer::Outer)
        })
    }

    fn resolve(&self, node_id: &str) -> Result<PublicKeys> {
        self.keystore.lookup_public(node_id).map_err(|e| match e {
            Error::UnknownNode(id) => Error::KeyLookupError(id),
            Error::InvalidKey(_) => Error::KeyLookupError(node_id.to_string()),
            other => other,
        })
    }
}

/// Associated data binding the box to its addressing and expiry
fn build_aad(origin: &str, destination: &str, ttl: DateTime<Utc>) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_CONTEXT.len() + origin.len() + destination.len() + 16);
    aad.extend_from_slice(AAD_CONTEXT);
    aad.extend_from_slice(&(origin.len() as u32).to_be_bytes());
    aad.extend_from_slice(origin.as_bytes());
    aad.extend_from_slice(&(destination.len() as u32).to_be_bytes());
    aad.extend_from_slice(destination.as_bytes());
    aad.extend_from_slice(&ttl.timestamp_millis().to_be_bytes());
    aad
}

// ============================================================================
// TESTS
// ============================================================================
