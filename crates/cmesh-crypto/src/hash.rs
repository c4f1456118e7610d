use cmesh_core::AccountId;

/// Derive an `AccountId` from a public key's PEM text, per spec §3: `acct_`
/// + first 16 hex chars of SHA-256(PEM bytes).
pub fn account_id_from_pem(pubkey_pem: &str) -> AccountId {
    AccountId::derive(pubkey_pem)
}
