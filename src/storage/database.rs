//! # SQLite Receipt Log
//!
//! Durable [`ReceiptLog`] backed by rusqlite.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{schema, ReceiptLog};
use crate::crypto::Fingerprint;
use crate::custody::Receipt;
use crate::error::{Error, Result};

/// A receipt log stored in SQLite
pub struct SqliteReceiptLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReceiptLog {
    /// Open or create a receipt database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let initialized: bool = conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to read schema: {}", e)))?;

        let version: Option<i32> = if initialized {
            conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to read schema version: {}", e)))?
        } else {
            None
        };

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::DatabaseError(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Receipt database created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Receipt database version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Receipt database version: {}", v);
            }
        }

        Ok(())
    }

    /// Number of stored receipts
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl ReceiptLog for SqliteReceiptLog {
    fn append_receipt_record(&self, receipt: &Receipt) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO receipts (custodian_id, timestamp, fingerprint) VALUES (?, ?, ?)",
            params![
                receipt.custodian_id(),
                encode_timestamp(receipt.timestamp()),
                receipt.fingerprint().to_hex(),
            ],
        )
        .map_err(|e| Error::StorageWriteError(format!("Failed to append receipt: {}", e)))?;

        tracing::debug!(
            custodian = receipt.custodian_id(),
            fingerprint = %receipt.fingerprint(),
            "Persisted receipt"
        );
        Ok(())
    }

    fn receipts_for_node(
        &self,
        node_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Receipt>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT custodian_id, timestamp, fingerprint FROM receipts
             WHERE custodian_id = ?1
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(
            params![node_id, from.map(encode_timestamp), to.map(encode_timestamp)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        let mut receipts = Vec::new();
        for row in rows {
            let (custodian_id, timestamp, fingerprint) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| Error::StorageReadError(format!("Bad receipt timestamp: {}", e)))?
                .with_timezone(&Utc);
            let fingerprint = Fingerprint::from_hex(&fingerprint)
                .map_err(|e| Error::StorageReadError(e.to_string()))?;
            receipts.push(Receipt::new(custodian_id, timestamp, fingerprint));
        }
        Ok(receipts)
    }
}

/// Fixed-width RFC 3339 so that SQLite's text comparison orders by time
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
