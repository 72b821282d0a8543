//! # Courier Demo
//!
//! Three nodes that are never online together pass a bundle over a shared
//! folder standing in for a USB stick.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example courier_demo
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use endrun::{
    ConsumeOutcome, ContentTransport, CourierNode, DirCarrier, KeyStore, NodeConfig,
    ReceiveOutcome, Result,
};

struct Notes(&'static str);

#[async_trait]
impl ContentTransport for Notes {
    async fn produce_blob(&self, node_id: &str) -> Result<Vec<u8>> {
        Ok(format!("{} says: {}", node_id, self.0).into_bytes())
    }

    async fn consume_blob(&self, blob: Vec<u8>) -> Result<ConsumeOutcome> {
        println!("  📨 {}", String::from_utf8_lossy(&blob));
        Ok(ConsumeOutcome::Applied)
    }
}

fn node(
    id: &str,
    neighbours: &[&str],
    keystore: &KeyStore,
    media: &Arc<DirCarrier>,
) -> CourierNode {
    let mut config = NodeConfig::new(id);
    config.neighbours = neighbours.iter().map(|n| n.to_string()).collect();
    config.default_copies = 4;
    CourierNode::new(
        config,
        keystore.clone(),
        Arc::new(Notes("the bridge on route 9 is out")),
        media.clone(),
    )
    .expect("Failed to build node")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "endrun=info".into()),
        )
        .init();

    println!("=== endrun: Courier Demo ===\n");
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                                                             │");
    println!("  │   alice ──(stick)──► carol ──(stick)──► bob                 │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    let keystore = KeyStore::in_memory();
    for id in ["alice", "bob", "carol"] {
        keystore.generate_identity(id).expect("Failed to create identity");
    }

    let stick = tempfile::tempdir().expect("Failed to create media dir");
    let media = Arc::new(DirCarrier::open(stick.path()).expect("Failed to open media"));
    println!("Media mounted at {}\n", media.dir().display());

    let alice = node("alice", &["carol"], &keystore, &media);
    let carol = node("carol", &["bob"], &keystore, &media);
    let bob = node("bob", &[], &keystore, &media);

    println!("Step 1: alice transmits to bob...");
    let report = alice.transmit("bob").await.expect("Transmit failed");
    println!("  handed off {} copy(ies)\n", report.handed_off);

    println!("Step 2: carol plugs in the stick...");
    for envelope in media.collect_for("carol").expect("Failed to read media") {
        match carol.receive(envelope).await.expect("Receive failed") {
            ReceiveOutcome::Relayed(report) => {
                println!("  relayed {} copy(ies)", report.handed_off)
            }
            other => println!("  {:?}", other),
        }
    }
    println!();

    println!("Step 3: bob plugs in the stick...");
    for envelope in media.collect_for("bob").expect("Failed to read media") {
        let chain: Vec<_> = envelope
            .custody_chain()
            .iter()
            .map(|r| r.custodian_id().to_string())
            .collect();
        println!("  custody: {}", chain.join(" → "));
        if let ReceiveOutcome::Delivered { receipt, .. } =
            bob.receive(envelope).await.expect("Receive failed")
        {
            println!("  receipt at {}", receipt.timestamp());
        }
    }
    println!();

    println!("=== Demo Complete ===");
}
