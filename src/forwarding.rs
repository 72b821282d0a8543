//! # Forwarding Policy
//!
//! Bounded-epidemic relay decisions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ON RECEIVE                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   now > ttl ?  ──yes──►  Drop(Expired)                                  │
//! │       │ no                                                              │
//! │   destination == local ?  ──yes──►  Deliver                             │
//! │       │ no                                                              │
//! │   copies > 0 and local not in chain ?  ──yes──►  Relay                  │
//! │       │ no                                                              │
//! │   Drop(Exhausted)                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expiry is checked first, so an expired envelope is dropped even at its
//! destination and even with budget left. There is no acknowledgement
//! path: copies already handed out keep travelling until they expire or
//! run out of budget.

use std::sync::Arc;

use crate::custody::{CustodyLedger, Receipt};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::time::{Clock, SystemClock};

/// Why an envelope was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// TTL has passed
    Expired,
    /// No copy budget left, or this node already handled it
    Exhausted,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Expired => write!(f, "expired"),
            DropReason::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// What to do with an envelope that just arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// This node is the destination
    Deliver,
    /// Record custody and pass copies on
    Relay,
    /// Discard
    Drop(DropReason),
}

/// One copy leaving this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Neighbour to hand it to, `None` for whatever courier picks it up next
    pub neighbour: Option<String>,
    /// The copy
    pub envelope: Envelope,
}

/// Result of relaying an envelope
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    /// This hop's receipt
    pub receipt: Receipt,
    /// Copies to hand off
    pub copies: Vec<Outbound>,
}

/// Decides deliver / relay / drop and produces relay copies
pub struct ForwardingPolicy {
    clock: Arc<dyn Clock>,
    ledger: CustodyLedger,
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ForwardingPolicy {
    /// Create a policy with a non-persisting ledger on the same clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: CustodyLedger::new(clock.clone()),
            clock,
        }
    }

    /// Use a specific ledger (for example one that persists receipts)
    pub fn with_ledger(mut self, ledger: CustodyLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// The ledger relay receipts go through
    pub fn ledger(&self) -> &CustodyLedger {
        &self.ledger
    }

    /// Decide what `local_node_id` should do with `envelope`
    pub fn on_receive(&self, envelope: &Envelope, local_node_id: &str) -> Decision {
        let decision = if envelope.is_expired_at(self.clock.now()) {
            Decision::Drop(DropReason::Expired)
        } else if envelope.destination() == local_node_id {
            Decision::Deliver
        } else if envelope.copies_remaining() > 0 && !envelope.has_custodian(local_node_id) {
            Decision::Relay
        } else {
            Decision::Drop(DropReason::Exhausted)
        };

        match decision {
            Decision::Drop(reason) => tracing::warn!(
                node = local_node_id,
                origin = envelope.origin(),
                destination = envelope.destination(),
                copies = envelope.copies_remaining(),
                hops = envelope.custody_chain().len(),
                reason = %reason,
                "Dropping envelope"
            ),
            _ => tracing::debug!(
                node = local_node_id,
                destination = envelope.destination(),
                copies = envelope.copies_remaining(),
                decision = ?decision,
                "Forwarding decision"
            ),
        }
        decision
    }

    /// Record this hop and produce the outbound copies
    ///
    /// One receipt is appended. Each eligible neighbour (not this node, not
    /// the origin, not already in the chain) gets one copy while budget
    /// remains, and each copy costs one unit of budget. Every copy carries
    /// the budget left after all of them were taken. If no neighbour is
    /// eligible a single copy is produced for the next physical courier.
    ///
    /// Fails with the matching error if [`on_receive`](Self::on_receive)
    /// would not say `Relay`.
    pub fn relay(
        &self,
        mut envelope: Envelope,
        local_node_id: &str,
        neighbours: &[String],
    ) -> Result<RelayOutcome> {
        match self.on_receive(&envelope, local_node_id) {
            Decision::Relay => {}
            Decision::Drop(DropReason::Expired) => return Err(Error::Expired(envelope.ttl())),
            Decision::Drop(DropReason::Exhausted) => return Err(Error::Exhausted),
            Decision::Deliver => {
                return Err(Error::InvalidArgument(format!(
                    "Envelope is addressed to {}, deliver it instead",
                    local_node_id
                )))
            }
        }

        let receipt = self.ledger.record(&mut envelope, local_node_id)?;

        let mut targets: Vec<&str> = Vec::new();
        for neighbour in neighbours {
            let eligible = neighbour != local_node_id
                && neighbour != envelope.origin()
                && !envelope.has_custodian(neighbour)
                && !targets.contains(&neighbour.as_str());
            if eligible {
                targets.push(neighbour);
            }
        }

        let copies = if targets.is_empty() {
            envelope.spend_copy();
            vec![Outbound {
                neighbour: None,
                envelope,
            }]
        } else {
            let take = targets.len().min(envelope.copies_remaining() as usize);
            for _ in 0..take {
                envelope.spend_copy();
            }
            targets[..take]
                .iter()
                .map(|neighbour| Outbound {
                    neighbour: Some(neighbour.to_string()),
                    envelope: envelope.clone(),
                })
                .collect()
        };

        tracing::debug!(
            node = local_node_id,
            copies_out = copies.len(),
            budget_left = copies.first().map(|c| c.envelope.copies_remaining()),
            "Relayed envelope"
        );

        Ok(RelayOutcome { receipt, copies })
    }
}

// ============================================================================
// TESTS
// ============================================================================
