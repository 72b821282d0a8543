//! # Courier Module
//!
//! One node's view of the protocol, wired to the outside world.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         COURIER NODE                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  transmit(destination)                                                  │
//! │    ContentTransport::produce_blob ──► wrap ──► record ──► fan out       │
//! │                                                                         │
//! │  receive(envelope)                                                      │
//! │    ForwardingPolicy::on_receive                                         │
//! │      ├── Deliver ──► record ──► unwrap ──► ContentTransport::consume    │
//! │      ├── Relay   ──► provenance + chain check ──► relay ──► fan out     │
//! │      └── Drop    ──► logged, nothing else                               │
//! │                                                                         │
//! │  fan out: Carrier::hand_off per copy, concurrently, each bounded by     │
//! │           the configured hand-off timeout                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Hand-off failures are reported, not raised: copies that did reach a
//! neighbour have already spent budget and cannot be recalled.

mod media;

pub use media::DirCarrier;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::config::NodeConfig;
use crate::custody::{ChainAudit, CustodyLedger, Receipt};
use crate::envelope::{Envelope, EnvelopeService};
use crate::error::{Error, Result};
use crate::forwarding::{Decision, DropReason, ForwardingPolicy, Outbound};
use crate::identity::NodeIdentity;
use crate::keystore::KeyStore;
use crate::storage::ReceiptLog;
use crate::time::{Clock, SystemClock};

/// What the content side did with a delivered blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// New content was applied
    Applied,
    /// Everything in the blob was already present
    AlreadyPresent,
}

/// Produces and consumes the opaque blobs envelopes carry
#[async_trait]
pub trait ContentTransport: Send + Sync {
    /// Blob to send from `node_id`
    async fn produce_blob(&self, node_id: &str) -> Result<Vec<u8>>;

    /// Apply a delivered blob
    async fn consume_blob(&self, blob: Vec<u8>) -> Result<ConsumeOutcome>;
}

/// Moves an envelope copy one hop
#[async_trait]
pub trait Carrier: Send + Sync {
    /// Hand a copy to `neighbour`, or to whatever courier comes next if `None`
    async fn hand_off(&self, neighbour: Option<&str>, envelope: &Envelope) -> Result<()>;
}

/// A copy that did not leave this node
#[derive(Debug)]
pub struct HandoffFailure {
    /// Intended neighbour
    pub neighbour: Option<String>,
    /// Why
    pub error: Error,
}

/// Result of fanning copies out
#[derive(Debug)]
pub struct RelayReport {
    /// This node's receipt
    pub receipt: Receipt,
    /// Copies the carrier accepted
    pub handed_off: usize,
    /// Copies it did not
    pub failures: Vec<HandoffFailure>,
}

/// Result of [`CourierNode::receive`]
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// This node was the destination and the blob was consumed
    Delivered {
        /// This node's receipt
        receipt: Receipt,
        /// Content side result
        consumed: ConsumeOutcome,
    },
    /// Copies were passed on
    Relayed(RelayReport),
    /// Discarded by policy
    Dropped(DropReason),
    /// The payload no longer matches its custody chain
    Quarantined(ChainAudit),
}

/// Per-node orchestration of the protocol
pub struct CourierNode {
    config: NodeConfig,
    identity: NodeIdentity,
    envelopes: EnvelopeService,
    policy: ForwardingPolicy,
    receipts: Arc<dyn ReceiptLog>,
    content: Arc<dyn ContentTransport>,
    carrier: Arc<dyn Carrier>,
}

impl CourierNode {
    /// Build a node from its configuration on the system clock
    pub fn new(
        config: NodeConfig,
        keystore: KeyStore,
        content: Arc<dyn ContentTransport>,
        carrier: Arc<dyn Carrier>,
    ) -> Result<Self> {
        Self::with_clock(config, keystore, content, carrier, Arc::new(SystemClock))
    }

    /// Build a node on a specific clock
    ///
    /// Fails with `UnknownNode` if the key store holds no private keys
    /// for the configured node id.
    pub fn with_clock(
        config: NodeConfig,
        keystore: KeyStore,
        content: Arc<dyn ContentTransport>,
        carrier: Arc<dyn Carrier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let identity = keystore.lookup_private(&config.node_id)?;
        let receipts = config.open_receipt_log()?;
        let ledger = CustodyLedger::new(clock.clone()).with_log(receipts.clone());
        let policy = ForwardingPolicy::new(clock.clone()).with_ledger(ledger);
        let envelopes = EnvelopeService::new(keystore, &config).with_clock(clock);

        tracing::info!(
            node_id = %config.node_id,
            neighbours = ?config.neighbours,
            "Courier node ready"
        );

        Ok(Self {
            config,
            identity,
            envelopes,
            policy,
            receipts,
            content,
            carrier,
        })
    }

    /// This node's id
    pub fn node_id(&self) -> &str {
        self.identity.node_id()
    }

    /// Receipts this node has recorded
    pub fn receipt_log(&self) -> &Arc<dyn ReceiptLog> {
        &self.receipts
    }

    /// Wrap fresh content for `destination` and send the first copies
    ///
    /// The origin records the first receipt in the chain and spends one unit
    /// of the copy budget like any other custodian, so a budget of N copies
    /// allows N−1 relays after the origin.
    pub async fn transmit(&self, destination: &str) -> Result<RelayReport> {
        if destination == self.node_id() {
            return Err(Error::InvalidArgument(format!(
                "{} cannot transmit to itself",
                destination
            )));
        }

        let blob = self.content.produce_blob(self.node_id()).await?;
        let envelope = self.envelopes.wrap_for(&blob, &self.identity, destination)?;

        tracing::info!(
            origin = self.node_id(),
            destination = destination,
            fingerprint = %envelope.fingerprint(),
            copies = envelope.copies_remaining(),
            ttl = %envelope.ttl(),
            "Transmitting envelope"
        );

        let outcome = self
            .policy
            .relay(envelope, self.node_id(), &self.config.neighbours)?;
        Ok(self.fan_out(outcome.receipt, outcome.copies).await)
    }

    /// Handle an envelope that physically arrived at this node
    ///
    /// Policy drops and quarantines are `Ok` outcomes. Cryptographic
    /// failures on delivery and provenance failures on relay are `Err`.
    pub async fn receive(&self, mut envelope: Envelope) -> Result<ReceiveOutcome> {
        match self.policy.on_receive(&envelope, self.node_id()) {
            Decision::Drop(reason) => Ok(ReceiveOutcome::Dropped(reason)),

            Decision::Deliver => {
                if let Some(audit) = self.quarantine_check(&envelope) {
                    return Ok(ReceiveOutcome::Quarantined(audit));
                }

                let receipt = self.policy.ledger().record(&mut envelope, self.node_id())?;
                let blob = self.envelopes.unwrap(&envelope, &self.identity)?;
                let consumed = self.content.consume_blob(blob).await?;

                tracing::info!(
                    origin = envelope.origin(),
                    hops = envelope.custody_chain().len(),
                    consumed = ?consumed,
                    "Envelope delivered"
                );
                Ok(ReceiveOutcome::Delivered { receipt, consumed })
            }

            Decision::Relay => {
                if let Some(audit) = self.quarantine_check(&envelope) {
                    return Ok(ReceiveOutcome::Quarantined(audit));
                }
                self.envelopes.verify_provenance(&envelope)?;

                let outcome = self
                    .policy
                    .relay(envelope, self.node_id(), &self.config.neighbours)?;
                Ok(ReceiveOutcome::Relayed(
                    self.fan_out(outcome.receipt, outcome.copies).await,
                ))
            }
        }
    }

    /// `Some` if the payload no longer matches the chain
    ///
    /// Timestamp regressions are only logged; disconnected nodes drift.
    fn quarantine_check(&self, envelope: &Envelope) -> Option<ChainAudit> {
        let ledger = self.policy.ledger();
        let audit = ledger.audit_chain(envelope);
        if audit.is_intact() {
            return None;
        }
        if !ledger.verify_chain(envelope) {
            tracing::warn!(
                node = self.node_id(),
                origin = envelope.origin(),
                audit = ?audit,
                "Quarantining envelope with broken custody chain"
            );
            return Some(audit);
        }
        tracing::warn!(node = self.node_id(), audit = ?audit, "Custody chain irregular");
        None
    }

    async fn fan_out(&self, receipt: Receipt, copies: Vec<Outbound>) -> RelayReport {
        let timeout = self.config.handoff_timeout();

        let attempts = copies.iter().map(|out| async move {
            let neighbour = out.neighbour.as_deref();
            let result =
                match tokio::time::timeout(timeout, self.carrier.hand_off(neighbour, &out.envelope))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::TransportFailure(format!(
                        "Hand-off timed out after {}s",
                        timeout.as_secs()
                    ))),
                };
            (out.neighbour.clone(), result)
        });

        let mut handed_off = 0;
        let mut failures = Vec::new();
        for (neighbour, result) in join_all(attempts).await {
            match result {
                Ok(()) => handed_off += 1,
                Err(error) => {
                    tracing::warn!(
                        node = self.node_id(),
                        neighbour = ?neighbour,
                        error = %error,
                        recoverable = error.is_recoverable(),
                        "Hand-off failed"
                    );
                    failures.push(HandoffFailure { neighbour, error });
                }
            }
        }

        tracing::debug!(
            node = self.node_id(),
            handed_off = handed_off,
            failed = failures.len(),
            "Fan-out complete"
        );

        RelayReport {
            receipt,
            handed_off,
            failures,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct StaticContent(Vec<u8>);

    #[async_trait]
    impl ContentTransport for StaticContent {
        async fn produce_blob(&self, _node_id: &str) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }

        async fn consume_blob(&self, _blob: Vec<u8>) -> Result<ConsumeOutcome> {
            Ok(ConsumeOutcome::Applied)
        }
    }

    #[derive(Default)]
    struct RecordingCarrier {
        sent: Mutex<Vec<(Option<String>, Envelope)>>,
    }

    #[async_trait]
    impl Carrier for RecordingCarrier {
        async fn hand_off(&self, neighbour: Option<&str>, envelope: &Envelope) -> Result<()> {
            self.sent
                .lock()
                .push((neighbour.map(str::to_string), envelope.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transmit_records_origin_receipt() {
        let keystore = KeyStore::in_memory();
        keystore.generate_identity("alice").unwrap();
        keystore.generate_identity("bob").unwrap();

        let mut config = NodeConfig::new("alice");
        config.default_copies = 3;
        config.neighbours = vec!["carol".into(), "dave".into()];

        let carrier = Arc::new(RecordingCarrier::default());
        let node = CourierNode::new(
            config,
            keystore,
            Arc::new(StaticContent(b"bundle".to_vec())),
            carrier.clone(),
        )
        .unwrap();

        let report = node.transmit("bob").await.unwrap();
        assert_eq!(report.handed_off, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.receipt.custodian_id(), "alice");

        let sent = carrier.sent.lock();
        assert_eq!(sent.len(), 2);
        for (_, envelope) in sent.iter() {
            assert_eq!(envelope.copies_remaining(), 1);
            assert_eq!(envelope.custody_chain().len(), 1);
        }

        let logged = node.receipt_log().receipts_for_node("alice", None, None).unwrap();
        assert_eq!(logged, vec![report.receipt.clone()]);
    }

    #[tokio::test]
    async fn test_transmit_to_self_is_rejected() {
        let keystore = KeyStore::in_memory();
        keystore.generate_identity("alice").unwrap();
        let node = CourierNode::new(
            NodeConfig::new("alice"),
            keystore,
            Arc::new(StaticContent(Vec::new())),
            Arc::new(RecordingCarrier::default()),
        )
        .unwrap();

        assert!(matches!(node.transmit("alice").await, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_node_requires_private_keys() {
        let keystore = KeyStore::in_memory();
        let result = CourierNode::new(
            NodeConfig::new("alice"),
            keystore,
            Arc::new(StaticContent(Vec::new())),
            Arc::new(RecordingCarrier::default()),
        );
        assert!(matches!(result, Err(Error::UnknownNode(_))));
    }
}
