//! # Error Handling
//!
//! One error type for the whole courier core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Identity / Key Errors                                             │
//! │  │   ├── UnknownNode           - No material for this node id          │
//! │  │   ├── DuplicateIdentity     - Material already exists               │
//! │  │   ├── KeyLookupError        - Envelope keys could not be resolved   │
//! │  │   └── InvalidKey            - Malformed key record                  │
//! │  │                                                                      │
//! │  ├── Envelope Errors                                                   │
//! │  │   ├── DestinationMismatch   - unwrap() at the wrong node            │
//! │  │   ├── Expired               - TTL has passed                        │
//! │  │   ├── SignatureInvalid      - Outer or inner signature rejected     │
//! │  │   ├── DecryptionFailed      - Box could not be opened               │
//! │  │   └── MalformedEnvelope     - Undecodable wire form                 │
//! │  │                                                                      │
//! │  ├── Policy Errors                                                     │
//! │  │   └── Exhausted             - Copy budget spent                     │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │                                                                      │
//! │  └── Transport Errors                                                  │
//! │      └── TransportFailure      - The only recoverable class            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integrity failures (`SignatureInvalid`, `DecryptionFailed`) are terminal
//! for the envelope. `Expired` and `Exhausted` are terminal and logged.
//! `TransportFailure` is the one class a delivery loop may retry.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for endrun operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which of the two envelope signatures was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureLayer {
    /// Signature over the ciphertext, checkable by any custodian
    Outer,
    /// Signature over the original blob, checked after decryption
    Inner,
    /// A standalone signature outside an envelope
    Detached,
}

impl std::fmt::Display for SignatureLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outer => write!(f, "outer"),
            Self::Inner => write!(f, "inner"),
            Self::Detached => write!(f, "detached"),
        }
    }
}

/// Main error type for endrun
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity / Key Errors (100-199)
    // ========================================================================

    /// No key material is held for this node
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Key material already exists for this node
    #[error("Identity already exists for node {0}")]
    DuplicateIdentity(String),

    /// Key material needed by an envelope operation is unavailable
    #[error("Key lookup failed for node {0}")]
    KeyLookupError(String),

    /// Invalid key format, length or encoding
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========================================================================
    // Envelope Errors (200-299)
    // ========================================================================

    /// unwrap() was called at a node that is not the destination
    #[error("Envelope is addressed to {expected}, not {actual}")]
    DestinationMismatch {
        /// The envelope's destination
        expected: String,
        /// The node that attempted to open it
        actual: String,
    },

    /// The envelope's TTL has passed
    #[error("Envelope expired at {0}")]
    Expired(DateTime<Utc>),

    /// Signature verification failed
    #[error("Invalid {0} signature")]
    SignatureInvalid(SignatureLayer),

    /// Authenticated decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Envelope bytes could not be decoded
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    // ========================================================================
    // Policy Errors (300-399)
    // ========================================================================

    /// Copy budget exhausted
    #[error("Copy budget exhausted")]
    Exhausted,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================

    /// An external content or carrier collaborator failed
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    // ========================================================================
    // Configuration Errors (600-699)
    // ========================================================================

    /// Configuration is missing or invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Caller supplied an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Numeric error code, grouped by domain:
    /// - 100-199: Identity / keys
    /// - 200-299: Envelope
    /// - 300-399: Policy
    /// - 400-499: Storage
    /// - 500-599: Transport
    /// - 600-699: Configuration
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::UnknownNode(_) => 100,
            Error::DuplicateIdentity(_) => 101,
            Error::KeyLookupError(_) => 102,
            Error::InvalidKey(_) => 103,

            Error::DestinationMismatch { .. } => 200,
            Error::Expired(_) => 201,
            Error::SignatureInvalid(_) => 202,
            Error::DecryptionFailed(_) => 203,
            Error::EncryptionFailed(_) => 204,
            Error::MalformedEnvelope(_) => 205,

            Error::Exhausted => 300,

            Error::StorageReadError(_) => 400,
            Error::StorageWriteError(_) => 401,
            Error::DatabaseError(_) => 402,

            Error::TransportFailure(_) => 500,

            Error::InvalidConfig(_) => 600,

            Error::Internal(_) => 900,
            Error::InvalidArgument(_) => 901,
            Error::SerializationError(_) => 902,
            Error::DeserializationError(_) => 903,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only transport failures may be retried. Everything else says
    /// something about the data or the deployment.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::TransportFailure(_))
    }

    /// Check if this error means the envelope failed a cryptographic check
    ///
    /// Such envelopes should be quarantined or discarded, never retried.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Error::SignatureInvalid(_) | Error::DecryptionFailed(_)
        )
    }

    /// Re-tag a signature failure with the envelope layer it came from
    pub(crate) fn at_layer(self, layer: SignatureLayer) -> Self {
        match self {
            Error::SignatureInvalid(_) => Error::SignatureInvalid(layer),
            other => other,
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::UnknownNode("a".into()).code(), 100);
        assert_eq!(Error::SignatureInvalid(SignatureLayer::Outer).code(), 202);
        assert_eq!(Error::Exhausted.code(), 300);
        assert_eq!(Error::DatabaseError("x".into()).code(), 402);
        assert_eq!(Error::TransportFailure("x".into()).code(), 500);
        assert_eq!(Error::Internal("x".into()).code(), 900);
    }

    #[test]
    fn test_only_transport_is_recoverable() {
        assert!(Error::TransportFailure("usb unplugged".into()).is_recoverable());
        assert!(!Error::Exhausted.is_recoverable());
        assert!(!Error::Expired(Utc::now()).is_recoverable());
        assert!(!Error::DecryptionFailed("tag".into()).is_recoverable());
    }

    #[test]
    fn test_integrity_failures() {
        assert!(Error::SignatureInvalid(SignatureLayer::Inner).is_integrity_failure());
        assert!(Error::DecryptionFailed("tag".into()).is_integrity_failure());
        assert!(!Error::KeyLookupError("b".into()).is_integrity_failure());
    }

    #[test]
    fn test_at_layer_only_touches_signatures() {
        let err = Error::SignatureInvalid(SignatureLayer::Detached).at_layer(SignatureLayer::Outer);
        assert!(matches!(err, Error::SignatureInvalid(SignatureLayer::Outer)));

        let err = Error::InvalidKey("bad".into()).at_layer(SignatureLayer::Outer);
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
