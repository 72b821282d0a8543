//! # Storage Module
//!
//! Durable record of the custody receipts a node has issued.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         RECEIPT LOG                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  CustodyLedger::record()                                                │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  ReceiptLog Trait                                               │    │
//! │  │                                                                 │    │
//! │  │  • append_receipt_record(receipt)                               │    │
//! │  │  • receipts_for_node(node, from, to)                            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │         │                               │                               │
//! │         ▼                               ▼                               │
//! │  MemoryReceiptLog                SqliteReceiptLog                       │
//! │  (tests, simulations)            (receipts table, rusqlite)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Envelopes carry their own chain; the log is the node-local audit trail
//! that survives after the envelope has moved on.

mod database;
mod schema;

pub use database::SqliteReceiptLog;
pub use schema::SCHEMA_VERSION;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::custody::Receipt;
use crate::error::Result;

/// Append-only store of receipts
pub trait ReceiptLog: Send + Sync {
    /// Persist one receipt
    fn append_receipt_record(&self, receipt: &Receipt) -> Result<()>;

    /// Receipts issued by `node_id`, oldest first, optionally bounded by
    /// inclusive timestamps
    fn receipts_for_node(
        &self,
        node_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Receipt>>;
}

/// In-memory receipt log
#[derive(Default)]
pub struct MemoryReceiptLog {
    receipts: RwLock<Vec<Receipt>>,
}

impl MemoryReceiptLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored receipts
    pub fn len(&self) -> usize {
        self.receipts.read().len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.receipts.read().is_empty()
    }
}

impl ReceiptLog for MemoryReceiptLog {
    fn append_receipt_record(&self, receipt: &Receipt) -> Result<()> {
        self.receipts.write().push(receipt.clone());
        Ok(())
    }

    fn receipts_for_node(
        &self,
        node_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Receipt>> {
        let mut matching: Vec<Receipt> = self
            .receipts
            .read()
            .iter()
            .filter(|r| r.custodian_id() == node_id)
            .filter(|r| from.map_or(true, |from| r.timestamp() >= from))
            .filter(|r| to.map_or(true, |to| r.timestamp() <= to))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.timestamp());
        Ok(matching)
    }
}
