//! End-to-end smoke test for a single capsulemesh node.
//!
//! Brings up a real coordinator (genesis mint, gossip transport bound to a
//! loopback port, sled-backed ledger/capsule/bazaar stores) and drives it
//! through transfer, capsule purchase, and task settlement exactly as
//! `cmesh-node`'s main loop would, minus the CLI parsing.
//!
//! Run with:
//!   cargo test -p cmesh-node --test smoke

use std::path::PathBuf;
use std::time::Duration;

use cmesh_core::{AccountId, Bounty, Price, TxType};
use cmesh_coordinator::MeshConfig;
use cmesh_crypto::{build_signed_transaction, KeyPair};
use cmesh_ledger::LedgerMode;
use cmesh_p2p::{GossipTransport, P2pConfig};

struct TempDir(PathBuf);

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

async fn start_leader(name: &str) -> (std::sync::Arc<cmesh_coordinator::Coordinator>, KeyPair, TempDir) {
    let dir = std::env::temp_dir().join(format!("cmesh_node_smoke_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let wallet = KeyPair::generate();
    let mut config = MeshConfig::new(dir.clone(), AccountId::from("acct_platform0000000"));
    config.p2p = P2pConfig { listen_addr: "127.0.0.1:0".into(), ..P2pConfig::default() };
    config.genesis_supply = 1_000_000;

    let (transport, handle) =
        GossipTransport::bind(config.p2p.clone(), wallet.account_id.as_str().to_string())
            .await
            .expect("bind gossip transport");
    tokio::spawn(transport.run());

    let (coordinator, _inbound_rx) =
        cmesh_coordinator::Coordinator::new(wallet.clone_for_test(), config, LedgerMode::Leader, handle)
            .expect("construct coordinator");
    (coordinator, wallet, TempDir(dir))
}

#[tokio::test]
async fn smoke_transfer_capsule_and_task_lifecycle() {
    let (coordinator, leader, _dir) = start_leader("lifecycle").await;

    // ── Genesis ────────────────────────────────────────────────────────────
    assert_eq!(coordinator.ledger().balance(&leader.account_id), 1_000_000);

    // ── Transfer ───────────────────────────────────────────────────────────
    let bob = AccountId::from("acct_bbbbbbbbbbbbbbbb");
    let nonce = coordinator.ledger().nonce(&leader.account_id) + 1;
    let tx = build_signed_transaction(
        &leader,
        TxType::Transfer,
        leader.account_id.clone(),
        bob.clone(),
        1_000,
        nonce,
        now_ms(),
    );
    let tx_id = coordinator.submit_tx(tx).await.expect("submit transfer");
    let confirmations = coordinator.wait_for_confirmations(&tx_id, 1).await;
    assert!(confirmations >= 1, "transfer should confirm locally on a leader");
    assert_eq!(coordinator.ledger().balance(&bob), 1_000);

    // ── Capsule publish + purchase ─────────────────────────────────────────
    let capsule = coordinator
        .publish_capsule(
            b"a reusable skill capsule".to_vec(),
            "skill".into(),
            vec!["demo".into()],
            Price { amount: 50, token: "mesh".into(), creator_share: 0.8 },
        )
        .await
        .expect("publish capsule");
    assert!(coordinator.capsules().has_access(&capsule.asset_id, coordinator.account_id()));

    // ── Task publish ───────────────────────────────────────────────────────
    let task = coordinator
        .publish_task(
            "summarize the attached document".into(),
            Bounty { amount: 300, token: "mesh".into() },
            vec!["nlp".into()],
        )
        .await
        .expect("publish task");

    let stored = coordinator.bazaar().get(&task.task_id).unwrap().unwrap();
    assert_eq!(stored.status, cmesh_core::TaskStatus::Open);
    assert_eq!(coordinator.ledger().balance(&stored.escrow_account_id), 300);
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

// A `KeyPair` deliberately has no public `Clone` — secret key material
// should never be duplicated implicitly. Tests need two handles on the same
// identity (one to sign with, one moved into the coordinator), so this
// helper reconstructs a second `KeyPair` from the serialized form instead of
// exposing a general-purpose `Clone` impl on the production type.
trait CloneForTest {
    fn clone_for_test(&self) -> Self;
}

impl CloneForTest for KeyPair {
    fn clone_for_test(&self) -> Self {
        let json = serde_json::to_string(self).expect("serialize keypair");
        serde_json::from_str(&json).expect("deserialize keypair")
    }
}
