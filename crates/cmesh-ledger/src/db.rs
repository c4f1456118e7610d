use std::path::Path;

use cmesh_core::{Account, AccountId, LogEntry, MeshError, MeshResult, Seq};

const META_LAST_SEQ: &str = "last_seq";
const META_LEADER_PUBKEY_PEM: &str = "leader_pubkey_pem";

/// Persistent ledger storage, backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   log      — seq (big-endian u64 bytes) → bincode(LogEntry)
///   accounts — AccountId bytes            → bincode(Account)
///   meta     — utf8 key bytes             → raw bytes (leader pubkey PEM, lastSeq)
pub struct StateDb {
    _db: sled::Db,
    log: sled::Tree,
    accounts: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Storage(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Serialization(e.to_string())
}

impl StateDb {
    /// Open or create the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let log = db.open_tree("log").map_err(storage_err)?;
        let accounts = db.open_tree("accounts").map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        Ok(Self { _db: db, log, accounts, meta })
    }

    // ── Log entries ───────────────────────────────────────────────────────────

    pub fn put_entry(&self, entry: &LogEntry) -> MeshResult<()> {
        let bytes = bincode::serialize(entry).map_err(ser_err)?;
        self.log.insert(entry.seq.to_be_bytes(), bytes).map_err(storage_err)?;
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }

    pub fn get_entry(&self, seq: Seq) -> MeshResult<Option<LogEntry>> {
        match self.log.get(seq.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn entries_since(&self, since_seq: Seq, limit: usize) -> MeshResult<Vec<LogEntry>> {
        let mut out = Vec::new();
        let start = since_seq.saturating_add(1).to_be_bytes();
        for item in self.log.range(start..) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize::<LogEntry>(&bytes).map_err(ser_err)?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    pub fn iter_all_entries(&self) -> MeshResult<Vec<LogEntry>> {
        let mut out = Vec::new();
        for item in self.log.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    pub fn entry_count(&self) -> u64 {
        self.log.len() as u64
    }

    // ── Accounts ──────────────────────────────────────────────────────────────

    pub fn get_account(&self, id: &AccountId) -> MeshResult<Option<Account>> {
        match self.accounts.get(id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_account(&self, account: &Account) -> MeshResult<()> {
        let bytes = bincode::serialize(account).map_err(ser_err)?;
        self.accounts
            .insert(account.account_id.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    pub fn get_last_seq(&self) -> MeshResult<Seq> {
        match self.meta.get(META_LAST_SEQ).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    MeshError::Serialization("corrupt last_seq meta entry".into())
                })?;
                Ok(Seq::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    pub fn put_last_seq(&self, seq: Seq) -> MeshResult<()> {
        self.meta.insert(META_LAST_SEQ, &seq.to_be_bytes()).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_leader_pubkey_pem(&self) -> MeshResult<Option<String>> {
        match self.meta.get(META_LEADER_PUBKEY_PEM).map_err(storage_err)? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| MeshError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn put_leader_pubkey_pem(&self, pem: &str) -> MeshResult<()> {
        self.meta.insert(META_LEADER_PUBKEY_PEM, pem.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    pub fn flush(&self) -> MeshResult<()> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}
