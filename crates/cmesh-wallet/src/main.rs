//! cmesh-wallet
//!
//! Local key management for a capsulemesh node operator. Generates and
//! inspects the keyfile that `cmesh-node` loads on startup. This binary
//! never talks to a running node — there is no RPC client here, since the
//! mesh has no operator HTTP/WS surface to call into.
//!
//! Usage:
//!   cmesh-wallet keygen  [--keyfile <path>]
//!   cmesh-wallet show    [--keyfile <path>]

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use cmesh_crypto::KeyPair;

#[derive(Parser, Debug)]
#[command(
    name = "cmesh-wallet",
    version,
    about = "capsulemesh wallet — generate and inspect local keyfiles"
)]
struct Args {
    /// Path to the keyfile (JSON).
    #[arg(long, global = true, default_value = "~/.cmesh/wallet.json")]
    keyfile: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new Ed25519 keypair and save it to the keyfile.
    Keygen,

    /// Print the account id and public key from an existing keyfile.
    Show,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cmesh=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let keyfile = expand_tilde(&args.keyfile);

    match args.command {
        Command::Keygen => cmd_keygen(&keyfile),
        Command::Show => cmd_show(&keyfile),
    }
}

fn cmd_keygen(keyfile: &PathBuf) -> anyhow::Result<()> {
    if keyfile.exists() {
        bail!(
            "Keyfile {} already exists. Delete it first to generate a new key.",
            keyfile.display()
        );
    }
    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let kp = KeyPair::generate();
    let json = serde_json::to_string_pretty(&kp)?;
    std::fs::write(keyfile, &json)
        .with_context(|| format!("writing keyfile to {}", keyfile.display()))?;

    println!("Generated new keypair.");
    println!("Account ID: {}", kp.account_id);
    println!("Keyfile:    {}", keyfile.display());
    println!("\nBACK UP YOUR KEYFILE. Loss = permanent loss of the account it controls.");
    Ok(())
}

fn cmd_show(keyfile: &PathBuf) -> anyhow::Result<()> {
    if !keyfile.exists() {
        bail!(
            "Keyfile {} does not exist. Run `cmesh-wallet keygen` first.",
            keyfile.display()
        );
    }
    let json = std::fs::read_to_string(keyfile)
        .with_context(|| format!("reading keyfile {}", keyfile.display()))?;
    let kp: KeyPair = serde_json::from_str(&json).context("parsing keyfile JSON")?;
    kp.verify_self_consistent()
        .context("keyfile failed self-consistency check")?;

    println!("Account ID: {}", kp.account_id);
    println!("Public key (PEM):\n{}", kp.public_key_pem);
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
