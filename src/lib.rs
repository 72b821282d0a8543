//! # endrun
//!
//! A disconnection-tolerant secure courier protocol. Opaque content
//! bundles travel between nodes that are never guaranteed to be online at
//! the same time, carried hop by hop by untrusted intermediaries.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ENDRUN MODULES                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                        CourierNode                               │   │
//! │  │   transmit / receive, ContentTransport + Carrier collaborators   │   │
//! │  └──────┬─────────────────┬───────────────────┬─────────────────────┘   │
//! │         │                 │                   │                         │
//! │  ┌──────▼──────┐  ┌───────▼───────┐  ┌────────▼────────┐                │
//! │  │  Envelope   │  │  Forwarding   │  │    Custody      │                │
//! │  │  Service    │  │  Policy       │  │    Ledger       │                │
//! │  │             │  │               │  │                 │                │
//! │  │ - wrap      │  │ - Deliver     │  │ - receipts      │                │
//! │  │ - unwrap    │  │ - Relay       │  │ - chain audit   │                │
//! │  │ - provenance│  │ - Drop        │  │ - ReceiptLog    │                │
//! │  └──────┬──────┘  └───────────────┘  └────────┬────────┘                │
//! │         │                                     │                         │
//! │  ┌──────▼──────┐  ┌───────────────┐  ┌────────▼────────┐                │
//! │  │  KeyStore   │  │    Crypto     │  │    Storage      │                │
//! │  │             │  │               │  │                 │                │
//! │  │ - identities│  │ - Ed25519     │  │ - SQLite        │                │
//! │  │ - key files │  │ - X25519      │  │ - in-memory     │                │
//! │  │ - sealing   │  │ - XChaCha20   │  │                 │                │
//! │  └─────────────┘  └───────────────┘  └─────────────────┘                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Cryptographic primitives (keys, box, signatures, hashes)
//! - [`identity`] - Node identities and the versioned key encoding
//! - [`keystore`] - Key material lookup and provisioning
//! - [`envelope`] - The transport unit, wrap/unwrap and wire encodings
//! - [`custody`] - Receipts and the custody chain
//! - [`forwarding`] - Deliver / relay / drop decisions
//! - [`storage`] - Receipt persistence
//! - [`courier`] - Per-node orchestration
//! - [`config`] - Node configuration
//! - [`time`] - Injectable clocks
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Inner signature (Ed25519 over the blob)                                │
//! │  ─────────────────────────────────────────                              │
//! │  Only the destination sees it. Proves the origin produced the content.  │
//! │                                                                         │
//! │  Box (X25519 + XChaCha20-Poly1305)                                      │
//! │  ─────────────────────────────────                                      │
//! │  Only the destination can open it. Origin, destination and expiry are   │
//! │  bound as associated data, so rerouting or extending the TTL breaks it. │
//! │                                                                         │
//! │  Outer signature (Ed25519 over the ciphertext)                          │
//! │  ─────────────────────────────────────────────                          │
//! │  Any custodian can check provenance without being able to read.        │
//! │                                                                         │
//! │  Custody chain (SHA-256 fingerprints)                                   │
//! │  ────────────────────────────────────                                   │
//! │  Each hop records the payload hash it saw. Receipts are unsigned.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod courier;
pub mod crypto;
pub mod custody;
pub mod envelope;
pub mod error;
pub mod forwarding;
pub mod identity;
pub mod keystore;
pub mod storage;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::NodeConfig;
pub use courier::{
    Carrier, ConsumeOutcome, ContentTransport, CourierNode, DirCarrier, ReceiveOutcome,
    RelayReport,
};
pub use crypto::{Fingerprint, PublicKeys};
pub use custody::{ChainAudit, CustodyLedger, Receipt};
pub use envelope::{Envelope, EnvelopeService};
pub use error::{Error, Result, SignatureLayer};
pub use forwarding::{Decision, DropReason, ForwardingPolicy, Outbound, RelayOutcome};
pub use identity::{NodeIdentity, PublicIdentity};
pub use keystore::KeyStore;
pub use storage::{MemoryReceiptLog, ReceiptLog, SqliteReceiptLog};
pub use time::{Clock, ManualClock, SystemClock};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of endrun
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
