//! # Envelope Demo
//!
//! Wraps a blob for one destination, shows what a custodian can and cannot
//! see, then opens it at the destination.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example envelope_demo
//! ```

use chrono::Duration;
use endrun::{EnvelopeService, Error, KeyStore, NodeConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "endrun=debug".into()),
        )
        .init();

    println!("=== endrun: Envelope Demo ===\n");

    // Step 1: Provision identities
    println!("Step 1: Generating identities for alice, bob and carol...");
    let keystore = KeyStore::in_memory();
    let alice = keystore
        .generate_identity("alice")
        .expect("Failed to create alice");
    let bob = keystore.generate_identity("bob").expect("Failed to create bob");
    let carol = keystore
        .generate_identity("carol")
        .expect("Failed to create carol");

    for identity in [&alice, &bob, &carol] {
        let keys = identity.public_keys();
        println!(
            "  {:<6} verify {}...  encrypt {}...",
            identity.node_id(),
            &keys.verify_key_hex()[..16],
            &hex::encode(keys.encryption)[..16]
        );
    }
    println!();

    // Step 2: Wrap
    println!("Step 2: alice wraps a bundle for bob...");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                    ENVELOPE LAYERS                          │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │   blob ──► sign(alice) ──► box(alice → bob) ──► sign(alice) │");
    println!("  │                                                             │");
    println!("  │   associated data: origin, destination, ttl                 │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    let service = EnvelopeService::new(keystore.clone(), &NodeConfig::new("alice"));
    let envelope = service
        .wrap(
            b"water levels at station 4: 2.3m",
            &alice,
            &bob.public_identity(),
            Duration::hours(6),
            3,
        )
        .expect("Failed to wrap");

    println!("  fingerprint: {}", envelope.fingerprint());
    println!("  payload:     {} bytes", envelope.payload().len());
    println!("  expires:     {}", envelope.ttl());
    println!("  copies:      {}", envelope.copies_remaining());
    println!();

    // Step 3: A custodian's view
    println!("Step 3: carol (a custodian) inspects it...");
    match service.verify_provenance(&envelope) {
        Ok(()) => println!("  ✓ Outer signature checks out: alice sent this"),
        Err(e) => println!("  ✗ Provenance failed: {}", e),
    }
    match service.unwrap(&envelope, &carol) {
        Err(Error::DestinationMismatch { expected, actual }) => {
            println!("  ✓ carol cannot open it (for {}, not {})", expected, actual)
        }
        other => println!("  ✗ Unexpected: {:?}", other),
    }
    println!();

    // Step 4: On the wire
    println!("Step 4: Encoded forms...");
    let json = envelope.to_json().expect("Failed to encode JSON");
    let bytes = envelope.to_bytes().expect("Failed to encode bytes");
    println!("  JSON:   {} bytes", json.len());
    println!("  binary: {} bytes", bytes.len());
    println!();

    // Step 5: Deliver
    println!("Step 5: bob opens it...");
    let blob = service.unwrap(&envelope, &bob).expect("Failed to unwrap");
    println!("  ✓ {}", String::from_utf8_lossy(&blob));
    println!();

    println!("=== Demo Complete ===");
}
