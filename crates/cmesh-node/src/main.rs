//! cmesh-node — the capsulemesh full-node binary.
//!
//! Startup sequence:
//!   1. Load (or generate) the node's wallet keyfile
//!   2. Bind the gossip transport and dial any bootstrap peers
//!   3. Open the ledger/capsule/rating/bazaar stores and build the coordinator
//!      (genesis is minted once, only in leader mode, on a fresh ledger)
//!   4. Run the coordinator's event loop until the process is killed

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use cmesh_core::{AccountId, Balance};
use cmesh_coordinator::{Coordinator, MeshConfig};
use cmesh_crypto::KeyPair;
use cmesh_ledger::LedgerMode;
use cmesh_p2p::{GossipTransport, P2pConfig};

#[derive(Parser, Debug)]
#[command(
    name = "cmesh-node",
    version,
    about = "capsulemesh node — gossip transport, ledger, capsule bazaar"
)]
struct Args {
    /// Directory for all persistent state (ledger, capsules, ratings, tasks).
    #[arg(long, default_value = "~/.cmesh/data")]
    data_dir: PathBuf,

    /// Path to this node's wallet keyfile. Generated on first run if absent.
    #[arg(long, default_value = "~/.cmesh/wallet.json")]
    keyfile: PathBuf,

    /// TCP address the gossip transport listens on.
    #[arg(long, default_value = "0.0.0.0:7777")]
    p2p_listen: String,

    /// Bootstrap peer addresses (comma-separated `host:port`).
    #[arg(long, value_delimiter = ',')]
    bootstrap: Vec<String>,

    /// Run as the ledger leader (mints genesis, accepts direct `Tx` submissions
    /// and appends them). Exactly one node per mesh should run as leader.
    #[arg(long)]
    leader: bool,

    /// Account the genesis supply is minted into when running as leader on a
    /// fresh ledger. Defaults to this node's own wallet account.
    #[arg(long)]
    genesis_account: Option<String>,

    /// Genesis supply to mint, only applied once on a fresh leader ledger.
    #[arg(long, default_value_t = 1_000_000_000)]
    genesis_supply: Balance,

    /// Account that capsule-publish and task-publish fees, and capsule
    /// purchase platform shares, are routed to.
    #[arg(long)]
    platform_account: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cmesh=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("capsulemesh node starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    // ── Wallet ─────────────────────────────────────────────────────────────
    let keyfile = expand_tilde(&args.keyfile);
    let wallet = load_or_generate_wallet(&keyfile).context("loading wallet keyfile")?;
    info!(account_id = %wallet.account_id, "wallet loaded");

    // ── Gossip transport ──────────────────────────────────────────────────
    let p2p_config = P2pConfig {
        listen_addr: args.p2p_listen.clone(),
        bootstrap_peers: args.bootstrap.clone(),
        ..P2pConfig::default()
    };
    let (transport, handle) = GossipTransport::bind(p2p_config, wallet.account_id.as_str().to_string())
        .await
        .context("binding gossip transport")?;
    info!(listen_addr = %args.p2p_listen, "gossip transport bound");
    tokio::spawn(transport.run());

    // ── Coordinator ────────────────────────────────────────────────────────
    let platform_account = args
        .platform_account
        .map(AccountId::from)
        .unwrap_or_else(|| wallet.account_id.clone());

    let mut config = MeshConfig::new(data_dir, platform_account);
    config.genesis_supply = args.genesis_supply;

    let mode = if args.leader { LedgerMode::Leader } else { LedgerMode::Follower };
    let (coordinator, inbound_rx): (Arc<Coordinator>, _) =
        Coordinator::new(wallet, config, mode, handle).context("constructing coordinator")?;

    info!(mode = ?mode, "coordinator ready");
    coordinator.run(inbound_rx).await;

    Ok(())
}

/// Load a wallet keyfile, generating and persisting a fresh one if it
/// doesn't exist yet (mirrors `cmesh-wallet keygen`, inlined so a node can
/// be brought up with zero prior setup).
fn load_or_generate_wallet(keyfile: &Path) -> anyhow::Result<KeyPair> {
    if keyfile.exists() {
        let json = std::fs::read_to_string(keyfile)
            .with_context(|| format!("reading keyfile {}", keyfile.display()))?;
        let kp: KeyPair = serde_json::from_str(&json).context("parsing keyfile JSON")?;
        kp.verify_self_consistent().context("keyfile failed self-consistency check")?;
        return Ok(kp);
    }

    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kp = KeyPair::generate();
    let json = serde_json::to_string_pretty(&kp)?;
    std::fs::write(keyfile, &json)
        .with_context(|| format!("writing keyfile to {}", keyfile.display()))?;
    info!(keyfile = %keyfile.display(), "generated new wallet keyfile");
    Ok(kp)
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
