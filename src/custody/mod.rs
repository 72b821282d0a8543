//! # Custody Module
//!
//! Per-hop receipts and the append-only chain carried inside an envelope.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CUSTODY CHAIN                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   alice ──► carol ──► dave ──► bob                                      │
//! │     │         │         │                                               │
//! │     ▼         ▼         ▼                                               │
//! │   [r0]  ──► [r0,r1] ──► [r0,r1,r2]                                      │
//! │                                                                         │
//! │   r = { custodian_id, timestamp, sha256(payload) }                      │
//! │                                                                         │
//! │   Every fingerprint must equal sha256(payload) at check time: a         │
//! │   custodian who alters the payload breaks every earlier receipt.        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Receipts are unsigned. They prove nothing about who wrote them, only
//! that the payload has not changed since they were written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Fingerprint;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::storage::ReceiptLog;
use crate::time::{Clock, SystemClock};

/// One hop's record of handling an envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt {
    custodian_id: String,
    timestamp: DateTime<Utc>,
    fingerprint: Fingerprint,
}

impl Receipt {
    /// Create a receipt
    pub fn new(
        custodian_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            custodian_id: custodian_id.into(),
            timestamp,
            fingerprint,
        }
    }

    /// Node that handled the envelope
    pub fn custodian_id(&self) -> &str {
        &self.custodian_id
    }

    /// When it was handled
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Payload fingerprint at that moment
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Result of a full chain audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAudit {
    /// Every check passed
    Intact,
    /// The receipt at `hop` does not match the current payload
    FingerprintMismatch {
        /// Index into the chain
        hop: usize,
    },
    /// The receipt at `hop` is older than the one before it
    TimestampRegression {
        /// Index into the chain
        hop: usize,
    },
    /// The custodian at `hop` already appears earlier in the chain
    RepeatedCustodian {
        /// Index into the chain
        hop: usize,
        /// The repeated node id
        custodian: String,
    },
}

impl ChainAudit {
    /// Whether the chain passed
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainAudit::Intact)
    }
}

/// Issues, appends, checks and persists receipts
pub struct CustodyLedger {
    clock: Arc<dyn Clock>,
    log: Option<Arc<dyn ReceiptLog>>,
}

impl Default for CustodyLedger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl CustodyLedger {
    /// Create a ledger that does not persist receipts
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, log: None }
    }

    /// Persist every recorded receipt to `log`
    pub fn with_log(mut self, log: Arc<dyn ReceiptLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// A receipt for `custodian_id` handling `envelope` now
    pub fn issue_receipt(&self, envelope: &Envelope, custodian_id: &str) -> Receipt {
        Receipt::new(custodian_id, self.clock.now(), envelope.fingerprint())
    }

    /// Extend the chain by one receipt
    pub fn append_to_chain(&self, mut envelope: Envelope, receipt: Receipt) -> Envelope {
        envelope.push_receipt(receipt);
        envelope
    }

    /// True iff every receipt's fingerprint matches the current payload
    pub fn verify_chain(&self, envelope: &Envelope) -> bool {
        let current = envelope.fingerprint();
        envelope
            .custody_chain()
            .iter()
            .all(|r| *r.fingerprint() == current)
    }

    /// Find the first problem in the chain, if any
    pub fn audit_chain(&self, envelope: &Envelope) -> ChainAudit {
        let current = envelope.fingerprint();
        let chain = envelope.custody_chain();

        for (hop, receipt) in chain.iter().enumerate() {
            if *receipt.fingerprint() != current {
                return ChainAudit::FingerprintMismatch { hop };
            }
            if chain[..hop]
                .iter()
                .any(|earlier| earlier.custodian_id() == receipt.custodian_id())
            {
                return ChainAudit::RepeatedCustodian {
                    hop,
                    custodian: receipt.custodian_id().to_string(),
                };
            }
            if hop > 0 && receipt.timestamp() < chain[hop - 1].timestamp() {
                return ChainAudit::TimestampRegression { hop };
            }
        }
        ChainAudit::Intact
    }

    /// Issue, persist and append in one step
    ///
    /// The envelope is only extended once the receipt is persisted.
    pub fn record(&self, envelope: &mut Envelope, custodian_id: &str) -> Result<Receipt> {
        let receipt = self.issue_receipt(envelope, custodian_id);

        if let Some(log) = &self.log {
            log.append_receipt_record(&receipt)?;
        }
        envelope.push_receipt(receipt.clone());

        tracing::debug!(
            custodian = custodian_id,
            fingerprint = %receipt.fingerprint(),
            hop = envelope.custody_chain().len() - 1,
            persisted = self.log.is_some(),
            "Recorded custody receipt"
        );
        Ok(receipt)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Nonce;
    use crate::storage::MemoryReceiptLog;
    use crate::time::ManualClock;
    use chrono::Duration;

    fn envelope() -> Envelope {
        Envelope {
            origin: "alice".into(),
            destination: "bob".into(),
            nonce: Nonce::random(),
            ttl: Utc::now() + Duration::hours(1),
            payload: b"outer-signed ciphertext".to_vec(),
            copies_remaining: 5,
            custody_chain: Vec::new(),
        }
    }

    #[test]
    fn test_issue_receipt_is_pure() {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = CustodyLedger::new(clock.clone());
        let envelope = envelope();

        let receipt = ledger.issue_receipt(&envelope, "carol");
        assert_eq!(receipt.custodian_id(), "carol");
        assert_eq!(receipt.timestamp(), clock.now());
        assert_eq!(*receipt.fingerprint(), Fingerprint::of(envelope.payload()));
        assert!(envelope.custody_chain().is_empty());
    }

    #[test]
    fn test_append_grows_by_one() {
        let ledger = CustodyLedger::default();
        let envelope = envelope();

        let first = ledger.issue_receipt(&envelope, "carol");
        let envelope = ledger.append_to_chain(envelope, first.clone());
        let second = ledger.issue_receipt(&envelope, "dave");
        let envelope = ledger.append_to_chain(envelope, second.clone());

        assert_eq!(envelope.custody_chain(), &[first, second]);
        assert!(ledger.verify_chain(&envelope));
        assert_eq!(ledger.audit_chain(&envelope), ChainAudit::Intact);
    }

    #[test]
    fn test_empty_chain_verifies() {
        let ledger = CustodyLedger::default();
        assert!(ledger.verify_chain(&envelope()));
        assert!(ledger.audit_chain(&envelope()).is_intact());
    }

    #[test]
    fn test_tampered_payload_breaks_chain() {
        let ledger = CustodyLedger::default();
        let mut envelope = envelope();
        ledger.record(&mut envelope, "carol").unwrap();
        ledger.record(&mut envelope, "dave").unwrap();

        envelope.payload[3] ^= 0xff;

        assert!(!ledger.verify_chain(&envelope));
        assert_eq!(
            ledger.audit_chain(&envelope),
            ChainAudit::FingerprintMismatch { hop: 0 }
        );
    }

    #[test]
    fn test_audit_flags_repeats_and_regressions() {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = CustodyLedger::new(clock.clone());

        let mut repeated = envelope();
        ledger.record(&mut repeated, "carol").unwrap();
        ledger.record(&mut repeated, "dave").unwrap();
        ledger.record(&mut repeated, "carol").unwrap();
        assert!(ledger.verify_chain(&repeated));
        assert_eq!(
            ledger.audit_chain(&repeated),
            ChainAudit::RepeatedCustodian {
                hop: 2,
                custodian: "carol".into()
            }
        );

        let mut regressed = envelope();
        ledger.record(&mut regressed, "carol").unwrap();
        clock.advance(Duration::minutes(-5));
        ledger.record(&mut regressed, "dave").unwrap();
        assert_eq!(
            ledger.audit_chain(&regressed),
            ChainAudit::TimestampRegression { hop: 1 }
        );
    }

    #[test]
    fn test_record_persists_before_appending() {
        let log = Arc::new(MemoryReceiptLog::new());
        let ledger = CustodyLedger::default().with_log(log.clone());
        let mut envelope = envelope();

        let receipt = ledger.record(&mut envelope, "carol").unwrap();

        assert_eq!(envelope.custody_chain(), &[receipt.clone()]);
        let stored = log.receipts_for_node("carol", None, None).unwrap();
        assert_eq!(stored, vec![receipt]);
    }
}
