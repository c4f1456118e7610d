//! P2P integration test for two capsulemesh nodes.
//!
//! Node A runs as ledger leader with no bootstrap peers. Node B runs as a
//! follower and bootstraps by dialing node A. A transaction submitted on A
//! is appended locally and gossiped as a `TxLog` entry; B must apply it and
//! converge on the same balance.
//!
//! Run with:
//!   cargo test -p cmesh-node --test p2p

use std::path::PathBuf;
use std::time::{Duration, Instant};

use cmesh_core::{AccountId, TxType};
use cmesh_coordinator::{Coordinator, MeshConfig};
use cmesh_crypto::{build_signed_transaction, KeyPair};
use cmesh_ledger::LedgerMode;
use cmesh_p2p::{GossipTransport, P2pConfig};

struct TempDir(PathBuf);

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn keypair_copy(kp: &KeyPair) -> KeyPair {
    let json = serde_json::to_string(kp).expect("serialize keypair");
    serde_json::from_str(&json).expect("deserialize keypair")
}

async fn spawn_node(
    name: &str,
    wallet: KeyPair,
    mode: LedgerMode,
    genesis_supply: u128,
    bootstrap: Vec<String>,
) -> (std::sync::Arc<Coordinator>, String, TempDir) {
    let dir = std::env::temp_dir().join(format!("cmesh_node_p2p_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let mut config = MeshConfig::new(dir.clone(), AccountId::from("acct_platform0000000"));
    config.p2p = P2pConfig { listen_addr: "127.0.0.1:0".into(), bootstrap_peers: bootstrap, ..P2pConfig::default() };
    config.genesis_supply = genesis_supply;

    let (transport, handle) =
        GossipTransport::bind(config.p2p.clone(), wallet.account_id.as_str().to_string())
            .await
            .expect("bind gossip transport");
    let listen_addr = format!("127.0.0.1:{}", transport.local_port());
    tokio::spawn(transport.run());

    let (coordinator, inbound_rx) =
        Coordinator::new(wallet, config, mode, handle).expect("construct coordinator");
    tokio::spawn(coordinator.clone().run(inbound_rx));

    (coordinator, listen_addr, TempDir(dir))
}

#[tokio::test]
async fn follower_converges_on_leader_transfer_via_gossip() {
    let leader_wallet = KeyPair::generate();
    let leader_wallet_for_signing = keypair_copy(&leader_wallet);

    let (leader, leader_addr, _dir_a) =
        spawn_node("leader", leader_wallet, LedgerMode::Leader, 1_000_000, vec![]).await;

    // Give node A's listener a moment before B dials it.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (follower, _follower_addr, _dir_b) = spawn_node(
        "follower",
        KeyPair::generate(),
        LedgerMode::Follower,
        1_000_000,
        vec![leader_addr],
    )
    .await;

    // Let the heartbeat/handshake establish the connection.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let alice = AccountId::from("acct_aaaaaaaaaaaaaaaa");
    let nonce = leader.ledger().nonce(&leader_wallet_for_signing.account_id) + 1;
    let tx = build_signed_transaction(
        &leader_wallet_for_signing,
        TxType::Transfer,
        leader_wallet_for_signing.account_id.clone(),
        alice.clone(),
        750,
        nonce,
        now_ms(),
    );
    leader.submit_tx(tx).await.expect("submit transfer on leader");

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if follower.ledger().balance(&alice) == 750 {
            break;
        }
        assert!(Instant::now() < deadline, "follower never converged on alice's balance via gossip");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    assert_eq!(leader.ledger().balance(&alice), 750);
    assert_eq!(follower.ledger().balance(&alice), 750);
}
