use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Balance, Nonce, Seq, Timestamp, TxId};

/// Transaction kind. `transfer` debits `from` and credits `to`; `mint` is
/// accepted only as the genesis record on an empty log; `escrow_release`
/// drains a synthetic `escrow_*` account and must be signed by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transfer,
    Mint,
    EscrowRelease,
}

/// The exact field set and order hashed/signed for a transaction. Field
/// order here IS the wire contract: `JSON.stringify({type,from,to,amount,
/// nonce,timestamp})` with no extra whitespace. Field declaration order is
/// preserved by `serde_json` for non-`#[serde(flatten)]` structs, so this
/// struct's order must never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPayload {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Balance,
    pub nonce: Nonce,
    pub timestamp: Timestamp,
}

impl CanonicalPayload {
    /// The exact bytes that get signed and hashed: compact JSON, field order
    /// as declared above, matching the original's `JSON.stringify`.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).expect("CanonicalPayload serialization is infallible")
    }
}

/// A signed transaction as it travels the wire and lives in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Balance,
    pub nonce: Nonce,
    pub timestamp: Timestamp,
    pub pubkey_pem: String,
    /// Hex-encoded Ed25519 signature over the canonical payload.
    pub signature: String,
    pub tx_id: TxId,
}

impl Transaction {
    pub fn canonical_payload(&self) -> CanonicalPayload {
        CanonicalPayload {
            tx_type: self.tx_type,
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
            nonce: self.nonce,
            timestamp: self.timestamp,
        }
    }

    /// Recompute the `txId` this transaction should carry; used both when
    /// building a new transaction and when validating one received over
    /// gossip (the stored `tx_id` must match).
    pub fn expected_tx_id(&self) -> TxId {
        TxId::from_payload_and_signature(
            &self.canonical_payload().to_canonical_json(),
            &self.signature,
        )
    }
}

/// An accepted transaction plus its position in the total order. The log is
/// indexed and replayed by `seq`; confirmations are derived from the gap
/// between a log entry's `seq` and the current `lastSeq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: Seq,
    pub tx: Transaction,
}

impl LogEntry {
    /// `confirmations = lastSeq - seq + 1`.
    pub fn confirmations(&self, last_seq: Seq) -> u64 {
        last_seq.saturating_sub(self.seq) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_payload_has_stable_field_order() {
        let payload = CanonicalPayload {
            tx_type: TxType::Transfer,
            from: AccountId::from("acct_0000000000000000"),
            to: AccountId::from("acct_1111111111111111"),
            amount: 100,
            nonce: 2,
            timestamp: 1_700_000_000_000,
        };
        let json = payload.to_canonical_json();
        assert_eq!(
            json,
            r#"{"type":"transfer","from":"acct_0000000000000000","to":"acct_1111111111111111","amount":100,"nonce":2,"timestamp":1700000000000}"#
        );
    }

    #[test]
    fn mutating_any_canonical_field_changes_the_json() {
        let base = CanonicalPayload {
            tx_type: TxType::Transfer,
            from: AccountId::from("acct_0000000000000000"),
            to: AccountId::from("acct_1111111111111111"),
            amount: 100,
            nonce: 2,
            timestamp: 1_700_000_000_000,
        };
        let mut mutated = base.clone();
        mutated.amount = 101;
        assert_ne!(base.to_canonical_json(), mutated.to_canonical_json());
    }
}
