//! # Database Schema
//!
//! SQL schema for the receipt log.
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │            receipts             │
//! ├─────────────────────────────────┤
//! │ id             INTEGER PK       │
//! │ custodian_id   TEXT             │
//! │ timestamp      TEXT (RFC 3339)  │
//! │ fingerprint    TEXT (hex)       │
//! └─────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Receipts table
-- One row per custody receipt this node issued
CREATE TABLE IF NOT EXISTS receipts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    -- Node that handled the envelope
    custodian_id TEXT NOT NULL,
    -- Receipt timestamp, fixed-width RFC 3339 UTC so text order is time order
    timestamp TEXT NOT NULL,
    -- SHA-256 of the envelope payload (hex encoded, 64 chars)
    fingerprint TEXT NOT NULL CHECK (length(fingerprint) = 64)
);
CREATE INDEX IF NOT EXISTS idx_receipts_custodian ON receipts(custodian_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_receipts_fingerprint ON receipts(fingerprint);
"#;
