use cmesh_core::{AccountId, Balance, MeshError, MeshResult, Nonce, Timestamp, Transaction, TxId, TxType};

use crate::keypair::{self, KeyPair};

/// Build and sign a transaction from its canonical fields. The resulting
/// `tx_id` is recomputed from `{canonical payload, signature}` so it is
/// never trusted from the caller (spec §3 "Transaction").
pub fn build_signed_transaction(
    keypair: &KeyPair,
    tx_type: TxType,
    from: AccountId,
    to: AccountId,
    amount: Balance,
    nonce: Nonce,
    timestamp: Timestamp,
) -> Transaction {
    let payload = cmesh_core::CanonicalPayload { tx_type, from: from.clone(), to, amount, nonce, timestamp };
    let canonical_json = payload.to_canonical_json();
    let signature = keypair.sign(canonical_json.as_bytes());
    let tx_id = TxId::from_payload_and_signature(&canonical_json, &signature);
    Transaction {
        tx_type,
        from,
        to: payload.to,
        amount,
        nonce,
        timestamp,
        pubkey_pem: keypair.public_key_pem.clone(),
        signature,
        tx_id,
    }
}

/// Verify the Ed25519 signature and recomputed `tx_id` of a transaction.
/// Does not check ledger-level invariants (balance, nonce, leader gating) —
/// those are `cmesh-ledger::verify`'s job.
pub fn verify_transaction_signature(tx: &Transaction) -> MeshResult<()> {
    let canonical_json = tx.canonical_payload().to_canonical_json();
    keypair::verify(&tx.pubkey_pem, canonical_json.as_bytes(), &tx.signature)?;
    if tx.expected_tx_id() != tx.tx_id {
        return Err(MeshError::BadSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let tx = build_signed_transaction(
            &kp,
            TxType::Transfer,
            kp.account_id.clone(),
            AccountId::from("acct_1111111111111111"),
            100,
            1,
            1_700_000_000_000,
        );
        assert!(verify_transaction_signature(&tx).is_ok());
    }

    #[test]
    fn tampered_amount_fails_tx_id_check() {
        let kp = KeyPair::generate();
        let mut tx = build_signed_transaction(
            &kp,
            TxType::Transfer,
            kp.account_id.clone(),
            AccountId::from("acct_1111111111111111"),
            100,
            1,
            1_700_000_000_000,
        );
        tx.amount = 999;
        assert!(verify_transaction_signature(&tx).is_err());
    }
}
