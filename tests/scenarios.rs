//! End-to-end courier scenarios driven through the public API.

use std::collections::HashSet;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Duration;

use endrun::{
    Clock, CustodyLedger, Decision, DropReason, Envelope, EnvelopeService, Error, ForwardingPolicy,
    KeyStore, ManualClock, NodeConfig, NodeIdentity, PublicIdentity, SignatureLayer,
};

struct Net {
    keystore: KeyStore,
    clock: Arc<ManualClock>,
}

impl Net {
    fn new(nodes: &[&str]) -> Self {
        let keystore = KeyStore::in_memory();
        for node in nodes {
            keystore.generate_identity(node).unwrap();
        }
        Self {
            keystore,
            clock: Arc::new(ManualClock::starting_now()),
        }
    }

    fn identity(&self, node: &str) -> NodeIdentity {
        self.keystore.lookup_private(node).unwrap()
    }

    fn public(&self, node: &str) -> PublicIdentity {
        self.keystore.export_public(node).unwrap()
    }

    fn service(&self, node: &str) -> EnvelopeService {
        EnvelopeService::new(self.keystore.clone(), &NodeConfig::new(node))
            .with_clock(self.clock.clone())
    }

    fn policy(&self) -> ForwardingPolicy {
        ForwardingPolicy::new(self.clock.clone())
    }

    fn wrap(&self, blob: &[u8], from: &str, to: &str, ttl: Duration, copies: u32) -> Envelope {
        self.service(from)
            .wrap(blob, &self.identity(from), &self.public(to), ttl, copies)
            .unwrap()
    }
}

/// Rewrite one field of the JSON form
fn edit_json(envelope: &Envelope, edit: impl FnOnce(&mut serde_json::Value)) -> Envelope {
    let mut value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
    edit(&mut value);
    Envelope::from_json(&value.to_string()).unwrap()
}

fn flip_payload_byte(envelope: &Envelope, index: usize) -> Envelope {
    edit_json(envelope, |value| {
        let mut payload = STANDARD.decode(value["payload"].as_str().unwrap()).unwrap();
        payload[index] ^= 0x01;
        value["payload"] = STANDARD.encode(payload).into();
    })
}

#[test]
fn relay_through_one_custodian_then_deliver() {
    let net = Net::new(&["alice", "bob", "carol"]);
    let policy = net.policy();

    let envelope = net.wrap(b"hello", "alice", "bob", Duration::hours(1), 2);
    assert_eq!(envelope.copies_remaining(), 2);
    assert!(envelope.custody_chain().is_empty());

    // carol relays toward bob
    assert_eq!(policy.on_receive(&envelope, "carol"), Decision::Relay);
    net.service("carol").verify_provenance(&envelope).unwrap();
    let outcome = policy
        .relay(envelope, "carol", &["bob".to_string()])
        .unwrap();
    assert_eq!(outcome.copies.len(), 1);
    let relayed = outcome.copies.into_iter().next().unwrap();
    assert_eq!(relayed.neighbour.as_deref(), Some("bob"));
    let envelope = relayed.envelope;
    assert_eq!(envelope.copies_remaining(), 1);
    assert_eq!(envelope.custody_chain().len(), 1);
    assert_eq!(envelope.custody_chain()[0].custodian_id(), "carol");

    // bob delivers
    net.clock.advance(Duration::minutes(10));
    assert_eq!(policy.on_receive(&envelope, "bob"), Decision::Deliver);
    let mut envelope = envelope;
    policy.ledger().record(&mut envelope, "bob").unwrap();
    let blob = net.service("bob").unwrap(&envelope, &net.identity("bob")).unwrap();

    assert_eq!(blob, b"hello");
    assert_eq!(envelope.custody_chain().len(), 2);
    assert!(policy.ledger().verify_chain(&envelope));
    assert!(policy.ledger().audit_chain(&envelope).is_intact());
}

#[test]
fn expired_envelope_is_dropped() {
    let net = Net::new(&["alice", "bob"]);
    let envelope = net.wrap(b"late", "alice", "bob", Duration::seconds(1), 3);

    net.clock.advance(Duration::seconds(2));

    let policy = net.policy();
    assert_eq!(
        policy.on_receive(&envelope, "bob"),
        Decision::Drop(DropReason::Expired)
    );
    assert_eq!(
        policy.on_receive(&envelope, "carol"),
        Decision::Drop(DropReason::Expired)
    );
    assert!(matches!(
        net.service("bob").unwrap(&envelope, &net.identity("bob")),
        Err(Error::Expired(_))
    ));
}

#[test]
fn budget_runs_out_after_exactly_n_hops() {
    let hops = ["c1", "c2", "c3", "c4"];
    let mut nodes = vec!["alice", "bob"];
    nodes.extend(hops);
    let net = Net::new(&nodes);
    let policy = net.policy();

    let mut envelope = net.wrap(b"chain", "alice", "bob", Duration::hours(1), 3);

    for (i, hop) in hops.iter().enumerate() {
        let next = hops.get(i + 1).map(|n| vec![n.to_string()]).unwrap_or_default();
        if i < 3 {
            assert_eq!(policy.on_receive(&envelope, hop), Decision::Relay);
            let outcome = policy.relay(envelope, hop, &next).unwrap();
            envelope = outcome.copies.into_iter().next().unwrap().envelope;
            assert_eq!(envelope.copies_remaining(), 2 - i as u32);
        } else {
            assert_eq!(
                policy.on_receive(&envelope, hop),
                Decision::Drop(DropReason::Exhausted)
            );
            assert!(matches!(
                policy.relay(envelope.clone(), hop, &next),
                Err(Error::Exhausted)
            ));
        }
    }

    // An exhausted envelope still reaches its destination
    assert_eq!(policy.on_receive(&envelope, "bob"), Decision::Deliver);
}

#[test]
fn revisiting_custodian_is_dropped() {
    let net = Net::new(&["alice", "bob", "carol", "dave"]);
    let policy = net.policy();
    let envelope = net.wrap(b"loop", "alice", "bob", Duration::hours(1), 5);

    let outcome = policy.relay(envelope, "carol", &["dave".to_string()]).unwrap();
    let envelope = outcome.copies.into_iter().next().unwrap().envelope;
    let outcome = policy.relay(envelope, "dave", &["carol".to_string()]).unwrap();

    // carol is already in the chain, so dave hands it to whoever comes next
    let only = &outcome.copies[0];
    assert_eq!(only.neighbour, None);
    assert_eq!(
        policy.on_receive(&only.envelope, "carol"),
        Decision::Drop(DropReason::Exhausted)
    );
}

#[test]
fn nonces_do_not_repeat() {
    let net = Net::new(&["alice", "bob"]);
    let service = net.service("alice");
    let alice = net.identity("alice");
    let bob = net.public("bob");

    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let envelope = service
            .wrap(b"x", &alice, &bob, Duration::hours(1), 1)
            .unwrap();
        assert!(seen.insert(*envelope.nonce().as_bytes()));
    }
}

#[test]
fn only_destination_can_open() {
    let net = Net::new(&["alice", "bob", "carol"]);
    let envelope = net.wrap(b"for bob", "alice", "bob", Duration::hours(1), 1);

    let err = net
        .service("carol")
        .unwrap(&envelope, &net.identity("carol"))
        .unwrap_err();
    assert!(matches!(err, Error::DestinationMismatch { .. }));

    // Relabelling the destination does not help either
    let relabelled = edit_json(&envelope, |value| value["destination"] = "carol".into());
    let err = net
        .service("carol")
        .unwrap(&relabelled, &net.identity("carol"))
        .unwrap_err();
    assert!(matches!(err, Error::DecryptionFailed(_)));
}

#[test]
fn extended_ttl_fails_to_decrypt() {
    let net = Net::new(&["alice", "bob"]);
    let envelope = net.wrap(b"short lived", "alice", "bob", Duration::minutes(5), 1);

    let extended = edit_json(&envelope, |value| {
        value["ttl"] = (envelope.ttl() + Duration::days(30)).to_rfc3339().into();
    });
    net.clock.advance(Duration::hours(1));

    assert_eq!(net.policy().on_receive(&extended, "bob"), Decision::Deliver);
    assert!(matches!(
        net.service("bob").unwrap(&extended, &net.identity("bob")),
        Err(Error::DecryptionFailed(_))
    ));
}

#[test]
fn tampered_payload_breaks_custody_and_provenance() {
    let net = Net::new(&["alice", "bob", "carol"]);
    let policy = net.policy();
    let envelope = net.wrap(b"evidence", "alice", "bob", Duration::hours(1), 2);
    let outcome = policy.relay(envelope, "carol", &["bob".to_string()]).unwrap();
    let envelope = outcome.copies.into_iter().next().unwrap().envelope;

    let tampered = flip_payload_byte(&envelope, envelope.payload().len() - 1);

    let ledger = CustodyLedger::new(net.clock.clone());
    assert!(ledger.verify_chain(&envelope));
    assert!(!ledger.verify_chain(&tampered));
    assert!(!ledger.audit_chain(&tampered).is_intact());

    assert!(matches!(
        net.service("bob").verify_provenance(&tampered),
        Err(Error::SignatureInvalid(SignatureLayer::Outer))
    ));
    assert!(matches!(
        net.service("bob").unwrap(&tampered, &net.identity("bob")),
        Err(Error::SignatureInvalid(SignatureLayer::Outer))
    ));
}

#[test]
fn wire_forms_survive_a_hop() {
    let net = Net::new(&["alice", "bob", "carol"]);
    let policy = net.policy();
    let envelope = net.wrap(b"over the wire", "alice", "bob", Duration::hours(1), 2);
    let outcome = policy.relay(envelope, "carol", &["bob".to_string()]).unwrap();
    let envelope = outcome.copies.into_iter().next().unwrap().envelope;

    let from_bytes = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
    let from_json = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
    assert_eq!(from_bytes, envelope);
    assert_eq!(from_json, envelope);

    let blob = net
        .service("bob")
        .unwrap(&from_bytes, &net.identity("bob"))
        .unwrap();
    assert_eq!(blob, b"over the wire");
    assert!(net.clock.now() < envelope.ttl());
}
