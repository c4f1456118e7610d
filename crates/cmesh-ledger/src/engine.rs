use std::sync::{Arc, Mutex};

use cmesh_core::{
    Account, AccountId, Balance, LogEntry, MeshError, MeshResult, Nonce, Seq, Transaction, TxId,
    TxType,
};
use cmesh_crypto::{verify_transaction_signature, KeyPair};
use tracing::{debug, info, warn};

use crate::db::StateDb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    Leader,
    Follower,
}

/// The signed transaction log: validation, append (leader) and ingestion
/// (follower), and the incrementally-maintained balance/nonce projection.
///
/// A single `Mutex` serializes all apply paths — `submit_local_as_leader`
/// and `apply_remote_entry` never partially apply an entry, and concurrent
/// callers see a consistent `lastSeq` (spec §5 "single writer").
pub struct LedgerEngine {
    db: Arc<StateDb>,
    mode: LedgerMode,
    write_lock: Mutex<()>,
}

impl LedgerEngine {
    pub fn open(db: Arc<StateDb>, mode: LedgerMode) -> Self {
        Self { db, mode, write_lock: Mutex::new(()) }
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    pub fn last_seq(&self) -> Seq {
        self.db.get_last_seq().unwrap_or(0)
    }

    pub fn leader_pubkey_pem(&self) -> Option<String> {
        self.db.get_leader_pubkey_pem().ok().flatten()
    }

    // ── Initialization ───────────────────────────────────────────────────────

    /// On first initialization as leader with an empty log, mint exactly one
    /// `mint` entry crediting the leader's own wallet with `genesis_supply`.
    /// Idempotent: a non-empty log is left untouched. Refuses to proceed if
    /// `wallet` is not the same key the ledger already recorded as leader
    /// (spec §4.1: a genesis leader must refuse any import that would change
    /// its public key once the ledger already carries a leader key).
    pub fn initialize(&self, wallet: &KeyPair, genesis_supply: Balance) -> MeshResult<()> {
        let _guard = self.write_lock.lock().unwrap();

        if self.mode != LedgerMode::Leader {
            return Ok(());
        }
        if self.db.entry_count() > 0 {
            if let Some(stored_pem) = self.db.get_leader_pubkey_pem()? {
                if stored_pem != wallet.public_key_pem {
                    return Err(MeshError::BadKeyMaterial(
                        "wallet public key does not match this ledger's recorded leader key".into(),
                    ));
                }
            }
            info!("ledger already initialized — skipping genesis mint");
            return Ok(());
        }

        let account = wallet.account_id.clone();
        let tx = cmesh_crypto::build_signed_transaction(
            wallet,
            TxType::Mint,
            account.clone(),
            account.clone(),
            genesis_supply,
            1,
            now_ms(),
        );
        let entry = LogEntry { seq: 1, tx };
        self.apply_and_persist(entry)?;
        self.db.put_leader_pubkey_pem(&wallet.public_key_pem)?;
        info!(account = %account, supply = genesis_supply, "genesis mint applied");
        Ok(())
    }

    // ── Validation ────────────────────────────────────────────────────────────

    /// Stateless + stateful validation shared by both append paths.
    pub fn verify(&self, tx: &Transaction) -> MeshResult<()> {
        if tx.pubkey_pem.is_empty() {
            return Err(MeshError::MissingField("pubkeyPem"));
        }
        if tx.signature.is_empty() {
            return Err(MeshError::MissingField("signature"));
        }
        if tx.amount == 0 {
            return Err(MeshError::BadAmount(tx.amount));
        }

        verify_transaction_signature(tx).map_err(|_| MeshError::BadSignature)?;

        match tx.tx_type {
            TxType::Mint => {
                if self.db.entry_count() > 0 {
                    return Err(MeshError::MintNotGenesis);
                }
                if tx.from != tx.to {
                    return Err(MeshError::MintNotGenesis);
                }
            }
            TxType::Transfer => {
                let signer_account = cmesh_crypto::account_id_from_pem(&tx.pubkey_pem);
                if signer_account != tx.from {
                    return Err(MeshError::FromMismatch);
                }
                self.check_nonce_and_balance(tx)?;
            }
            TxType::EscrowRelease => {
                if !tx.from.is_escrow() {
                    return Err(MeshError::BadEscrowAccount(tx.from.to_string()));
                }
                let leader_pem = self.db.get_leader_pubkey_pem()?;
                match leader_pem {
                    Some(pem) if pem == tx.pubkey_pem => {}
                    _ => return Err(MeshError::NotLeader),
                }
                self.check_balance_only(tx)?;
            }
        }
        Ok(())
    }

    fn check_nonce_and_balance(&self, tx: &Transaction) -> MeshResult<()> {
        let from_account = self.db.get_account(&tx.from)?.unwrap_or_else(|| Account::new(tx.from.clone()));
        let expected_nonce = from_account.next_expected_nonce();
        if tx.nonce != expected_nonce {
            return Err(MeshError::BadNonce { expected: expected_nonce, got: tx.nonce });
        }
        if from_account.balance < tx.amount {
            return Err(MeshError::InsufficientBalance { need: tx.amount, have: from_account.balance });
        }
        Ok(())
    }

    fn check_balance_only(&self, tx: &Transaction) -> MeshResult<()> {
        let from_account = self.db.get_account(&tx.from)?.unwrap_or_else(|| Account::new(tx.from.clone()));
        if from_account.balance < tx.amount {
            return Err(MeshError::InsufficientBalance { need: tx.amount, have: from_account.balance });
        }
        Ok(())
    }

    // ── Leader append ─────────────────────────────────────────────────────────

    pub fn submit_local_as_leader(&self, tx: Transaction) -> MeshResult<(Seq, TxId)> {
        if self.mode != LedgerMode::Leader {
            return Err(MeshError::NotLeader);
        }
        let _guard = self.write_lock.lock().unwrap();

        self.verify(&tx)?;
        let seq = self.db.get_last_seq()? + 1;
        let tx_id = tx.tx_id.clone();
        let entry = LogEntry { seq, tx };
        self.apply_and_persist(entry)?;
        Ok((seq, tx_id))
    }

    // ── Follower ingestion ────────────────────────────────────────────────────

    /// Requires `entry.seq == lastSeq + 1`; otherwise returns `OutOfOrder`
    /// without touching state. On the very first entry applied by a fresh
    /// follower, a `mint` entry's signer is implicitly trusted as leader.
    pub fn apply_remote_entry(&self, entry: LogEntry) -> MeshResult<()> {
        let _guard = self.write_lock.lock().unwrap();

        let last_seq = self.db.get_last_seq()?;
        if entry.seq != last_seq + 1 {
            return Err(MeshError::OutOfOrder { expected: last_seq + 1, got: entry.seq });
        }

        let bootstrapping = self.db.get_leader_pubkey_pem()?.is_none();
        if bootstrapping && entry.tx.tx_type == TxType::Mint {
            verify_transaction_signature(&entry.tx).map_err(|_| MeshError::BadSignature)?;
            self.db.put_leader_pubkey_pem(&entry.tx.pubkey_pem)?;
            info!(leader_pubkey_pem_len = entry.tx.pubkey_pem.len(), "follower trusting bootstrap leader key");
        } else {
            self.verify(&entry.tx)?;
        }

        self.apply_and_persist(entry)
    }

    /// Apply one already-validated entry's balance effects, persist it, and
    /// advance `lastSeq`. Never called twice for the same `(seq, txId)` by
    /// construction (the caller holds `write_lock` and has already checked
    /// contiguity).
    fn apply_and_persist(&self, entry: LogEntry) -> MeshResult<()> {
        self.apply_projection(&entry.tx)?;
        self.db.put_entry(&entry)?;
        self.db.put_last_seq(entry.seq)?;
        debug!(seq = entry.seq, tx_id = %entry.tx.tx_id, "applied log entry");
        Ok(())
    }

    fn apply_projection(&self, tx: &Transaction) -> MeshResult<()> {
        match tx.tx_type {
            TxType::Mint => {
                let mut to = self.db.get_account(&tx.to)?.unwrap_or_else(|| Account::new(tx.to.clone()));
                to.balance += tx.amount;
                to.nonce = tx.nonce;
                self.db.put_account(&to)?;
            }
            TxType::Transfer | TxType::EscrowRelease => {
                let mut from = self.db.get_account(&tx.from)?.unwrap_or_else(|| Account::new(tx.from.clone()));
                if from.balance < tx.amount {
                    warn!(from = %tx.from, "applying transfer that overdraws projected balance");
                }
                from.balance = from.balance.saturating_sub(tx.amount);
                from.nonce = tx.nonce;
                self.db.put_account(&from)?;

                let mut to = self.db.get_account(&tx.to)?.unwrap_or_else(|| Account::new(tx.to.clone()));
                to.balance += tx.amount;
                self.db.put_account(&to)?;
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn balance(&self, account: &AccountId) -> Balance {
        self.db.get_account(account).ok().flatten().map(|a| a.balance).unwrap_or(0)
    }

    pub fn nonce(&self, account: &AccountId) -> Nonce {
        self.db.get_account(account).ok().flatten().map(|a| a.nonce).unwrap_or(0)
    }

    pub fn confirmations(&self, tx_id: &TxId) -> Option<u64> {
        let last_seq = self.last_seq();
        self.db
            .iter_all_entries()
            .ok()?
            .into_iter()
            .find(|e| &e.tx.tx_id == tx_id)
            .map(|e| e.confirmations(last_seq))
    }

    pub fn entries_since(&self, seq: Seq, limit: usize) -> Vec<LogEntry> {
        self.db.entries_since(seq, limit).unwrap_or_default()
    }

    /// Replay the whole log from `seq=1` and recompute every balance/nonce
    /// from scratch. Used only in test builds to cross-check the
    /// incrementally-maintained projection (spec §9).
    pub fn rebuild_projection(&self) -> MeshResult<std::collections::HashMap<AccountId, Account>> {
        let mut projected: std::collections::HashMap<AccountId, Account> = std::collections::HashMap::new();
        for entry in self.db.iter_all_entries()? {
            let tx = &entry.tx;
            match tx.tx_type {
                TxType::Mint => {
                    let acc = projected.entry(tx.to.clone()).or_insert_with(|| Account::new(tx.to.clone()));
                    acc.balance += tx.amount;
                    acc.nonce = tx.nonce;
                }
                TxType::Transfer | TxType::EscrowRelease => {
                    let from = projected.entry(tx.from.clone()).or_insert_with(|| Account::new(tx.from.clone()));
                    from.balance = from.balance.saturating_sub(tx.amount);
                    from.nonce = tx.nonce;
                    let to = projected.entry(tx.to.clone()).or_insert_with(|| Account::new(tx.to.clone()));
                    to.balance += tx.amount;
                }
            }
        }
        Ok(projected)
    }

    pub fn db(&self) -> &Arc<StateDb> {
        &self.db
    }
}

fn now_ms() -> cmesh_core::Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
