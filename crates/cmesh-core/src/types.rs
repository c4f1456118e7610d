use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Token amount. Always non-negative; balances and bounties share this type.
pub type Balance = u128;

/// Unix timestamp in milliseconds, UTC.
pub type Timestamp = i64;

/// Per-account transaction counter, monotone from 1.
pub type Nonce = u64;

/// Log sequence number. Strictly increasing, starts at 1.
pub type Seq = u64;

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn sha256_prefix_hex(bytes: &[u8], hex_chars: usize) -> String {
    let full = sha256_hex(bytes);
    full[..hex_chars].to_string()
}

// ── AccountId ────────────────────────────────────────────────────────────────

/// `acct_` + first 16 hex chars of SHA-256(public key PEM).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn derive(pubkey_pem: &str) -> Self {
        Self(format!("acct_{}", sha256_prefix_hex(pubkey_pem.as_bytes(), 16)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `s` has the `acct_` prefix expected of an account id.
    pub fn looks_valid(s: &str) -> bool {
        s.starts_with("acct_") && s.len() == "acct_".len() + 16
    }

    /// True if this account id is a synthetic escrow sink (never has key material).
    pub fn is_escrow(&self) -> bool {
        self.0.starts_with("escrow_")
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── EscrowAccountId ───────────────────────────────────────────────────────────

/// `escrow_` + first 24 hex chars of SHA-256(task_id). No key material exists;
/// funds are only ever addressable through a leader-signed `escrow_release`.
pub fn escrow_account_id(task_id: &TaskId) -> AccountId {
    AccountId(format!("escrow_{}", sha256_prefix_hex(task_id.0.as_bytes(), 24)))
}

// ── TxId ─────────────────────────────────────────────────────────────────────

/// SHA-256 hex of `{canonical payload, signature}`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn from_payload_and_signature(canonical_json: &str, signature_hex: &str) -> Self {
        let mut buf = String::with_capacity(canonical_json.len() + signature_hex.len() + 16);
        buf.push_str(r#"{"canonical":"#);
        buf.push_str(canonical_json);
        buf.push_str(r#","signature":""#);
        buf.push_str(signature_hex);
        buf.push_str(r#""}"#);
        Self(sha256_hex(buf.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({}…)", &self.0[..16.min(self.0.len())])
    }
}

// ── TaskId ───────────────────────────────────────────────────────────────────

/// `task_` + first 16 hex chars of SHA-256(description || publisher || publishedAt).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn derive(description: &str, publisher: &AccountId, published_at: Timestamp) -> Self {
        let input = format!("{description}{publisher}{published_at}");
        Self(format!("task_{}", sha256_prefix_hex(input.as_bytes(), 16)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

// ── AssetId ──────────────────────────────────────────────────────────────────

/// `sha256:` + SHA-256 hex of the serialized capsule content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn derive(serialized_content: &[u8]) -> Self {
        Self(format!("sha256:{}", sha256_hex(serialized_content)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

// ── NodeId ───────────────────────────────────────────────────────────────────

/// Gossip-layer peer identity. In practice equal to the node's `AccountId`,
/// but kept distinct since a peer may be observed before any transaction
/// ties it to an account.
pub type NodeId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_is_deterministic() {
        let a = AccountId::derive("PEM-DATA");
        let b = AccountId::derive("PEM-DATA");
        assert_eq!(a, b);
        assert!(a.0.starts_with("acct_"));
        assert_eq!(a.0.len(), "acct_".len() + 16);
    }

    #[test]
    fn account_id_differs_by_key() {
        let a = AccountId::derive("PEM-ONE");
        let b = AccountId::derive("PEM-TWO");
        assert_ne!(a, b);
    }

    #[test]
    fn escrow_account_id_has_no_key_prefix_collision_with_acct() {
        let t = TaskId::derive("desc", &AccountId::from("acct_aaaaaaaaaaaaaaaa"), 1000);
        let e = escrow_account_id(&t);
        assert!(e.0.starts_with("escrow_"));
        assert_eq!(e.0.len(), "escrow_".len() + 24);
        assert!(e.is_escrow());
    }

    #[test]
    fn task_id_is_stable_for_same_inputs() {
        let publisher = AccountId::from("acct_0000000000000000");
        let a = TaskId::derive("do the thing", &publisher, 123);
        let b = TaskId::derive("do the thing", &publisher, 123);
        assert_eq!(a, b);
    }

    #[test]
    fn asset_id_changes_with_content() {
        let a = AssetId::derive(b"hello");
        let b = AssetId::derive(b"hello!");
        assert_ne!(a, b);
        assert!(a.0.starts_with("sha256:"));
    }
}
