use std::path::Path;

use cmesh_core::{AccountId, AssetId, CapsuleFilter, CapsuleRecord, CapsuleStatus, MeshError, MeshResult};
use tracing::{debug, warn};

fn storage_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Storage(e.to_string())
}
fn ser_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Serialization(e.to_string())
}

/// Content-addressed capsule repository. Public metadata (`records`) is
/// distinct from private `content`: the latter is held only for capsules
/// this node created or whose purchase has confirmed (`access`).
pub struct CapsuleStore {
    _db: sled::Db,
    records: sled::Tree,
    content: sled::Tree,
    /// `asset_id || "\0" || buyer_account_id` membership set.
    access: sled::Tree,
}

impl CapsuleStore {
    pub fn open<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let records = db.open_tree("capsule_records").map_err(storage_err)?;
        let content = db.open_tree("capsule_content").map_err(storage_err)?;
        let access = db.open_tree("capsule_access").map_err(storage_err)?;
        Ok(Self { _db: db, records, content, access })
    }

    /// Store a capsule this node created: `content` is known locally, so the
    /// declared `asset_id` is recomputed and checked (tamper detection,
    /// spec §4.4). Idempotent on `asset_id` — a second call with the same
    /// id is a no-op and returns the already-stored record.
    pub fn publish(
        &self,
        mut record: CapsuleRecord,
        content: &[u8],
    ) -> MeshResult<CapsuleRecord> {
        let recomputed = AssetId::derive(content);
        if recomputed != record.asset_id {
            return Err(MeshError::AssetIdMismatch {
                recomputed: recomputed.to_string(),
                stored: record.asset_id.to_string(),
            });
        }

        if let Some(existing) = self.get(&record.asset_id)? {
            return Ok(existing);
        }

        if record.capsule_type.is_empty() {
            record.capsule_type = "skill".to_string();
        }
        if record.confidence <= 0.0 {
            record.confidence = 0.5;
        }

        self.put_record(&record)?;
        self.content
            .insert(record.asset_id.as_str().as_bytes(), content)
            .map_err(storage_err)?;
        self.grant_access(&record.asset_id, &record.attribution.creator)?;
        debug!(asset_id = %record.asset_id, "capsule published");
        Ok(record)
    }

    /// Store capsule metadata received over gossip. Content is never part
    /// of the wire payload (spec §4.3 "capsule (metadata only)"), so no
    /// tamper check is possible here; idempotent on `asset_id`.
    pub fn store_remote_metadata(&self, record: CapsuleRecord) -> MeshResult<()> {
        if self.records.contains_key(record.asset_id.as_str().as_bytes()).map_err(storage_err)? {
            return Ok(());
        }
        self.put_record(&record)
    }

    fn put_record(&self, record: &CapsuleRecord) -> MeshResult<()> {
        let bytes = bincode::serialize(record).map_err(ser_err)?;
        self.records.insert(record.asset_id.as_str().as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get(&self, asset_id: &AssetId) -> MeshResult<Option<CapsuleRecord>> {
        match self.records.get(asset_id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn grant_access(&self, asset_id: &AssetId, account: &AccountId) -> MeshResult<()> {
        let key = access_key(asset_id, account);
        self.access.insert(key, b"".as_ref()).map_err(storage_err)?;
        Ok(())
    }

    pub fn has_access(&self, asset_id: &AssetId, account: &AccountId) -> bool {
        self.access.contains_key(access_key(asset_id, account)).unwrap_or(false)
    }

    /// Returns the private content only if `account` created or purchased
    /// this capsule.
    pub fn get_content_for(&self, asset_id: &AssetId, account: &AccountId) -> MeshResult<Option<Vec<u8>>> {
        if !self.has_access(asset_id, account) {
            warn!(asset_id = %asset_id, account = %account, "content access denied");
            return Ok(None);
        }
        match self.content.get(asset_id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bytes.to_vec())),
            None => Ok(None),
        }
    }

    pub fn query(&self, filter: &CapsuleFilter) -> MeshResult<Vec<CapsuleRecord>> {
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let record: CapsuleRecord = bincode::deserialize(&bytes).map_err(ser_err)?;
            if matches_filter(&record, filter) {
                out.push(record);
            }
        }
        // Sorted by confidence descending; ties broken by asset_id so
        // results are stable across calls with identical store contents.
        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.asset_id.as_str().cmp(b.asset_id.as_str()))
        });
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// Case-insensitive substring search over the serialized record.
    pub fn search(&self, text: &str) -> MeshResult<Vec<CapsuleRecord>> {
        let needle = text.to_lowercase();
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let record: CapsuleRecord = bincode::deserialize(&bytes).map_err(ser_err)?;
            let serialized = serde_json::to_string(&record).map_err(ser_err)?;
            if serialized.to_lowercase().contains(&needle) {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.asset_id.as_str().cmp(b.asset_id.as_str()));
        Ok(out)
    }
}

fn access_key(asset_id: &AssetId, account: &AccountId) -> Vec<u8> {
    let mut key = asset_id.as_str().as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(account.as_str().as_bytes());
    key
}

fn matches_filter(record: &CapsuleRecord, filter: &CapsuleFilter) -> bool {
    if let Some(t) = &filter.capsule_type {
        if &record.capsule_type != t {
            return false;
        }
    }
    if let Some(creator) = &filter.creator {
        if &record.attribution.creator != creator {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if record.status != status {
            return false;
        }
    }
    if !filter.tags.is_empty() && !filter.tags.iter().any(|t| record.tags.contains(t)) {
        return false;
    }
    if let Some(min_confidence) = filter.min_confidence {
        if record.confidence < min_confidence {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmesh_core::{Attribution, Price};

    fn temp_store(name: &str) -> (CapsuleStore, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cmesh_capsule_test_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (CapsuleStore::open(&dir).unwrap(), dir)
    }

    fn make_record(asset_id: AssetId, creator: &str, confidence: f64, tags: Vec<&str>) -> CapsuleRecord {
        CapsuleRecord {
            asset_id,
            capsule_type: "skill".into(),
            confidence,
            attribution: Attribution { creator: AccountId::from(creator) },
            tags: tags.into_iter().map(String::from).collect(),
            price: Price { amount: 100, token: "mesh".into(), creator_share: 0.8 },
            status: CapsuleStatus::Active,
        }
    }

    #[test]
    fn publish_detects_tampered_asset_id() {
        let (store, dir) = temp_store("tamper");
        let content = b"real content";
        let wrong_id = AssetId::derive(b"different content");
        let record = make_record(wrong_id, "acct_creator000000", 0.9, vec!["rust"]);
        let err = store.publish(record, content).unwrap_err();
        assert!(matches!(err, MeshError::AssetIdMismatch { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn publish_is_idempotent() {
        let (store, dir) = temp_store("idempotent");
        let content = b"capsule bytes";
        let asset_id = AssetId::derive(content);
        let record = make_record(asset_id, "acct_creator000000", 0.9, vec!["rust"]);
        let first = store.publish(record.clone(), content).unwrap();
        let second = store.publish(record, content).unwrap();
        assert_eq!(first.asset_id, second.asset_id);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn creator_has_content_access_but_stranger_does_not() {
        let (store, dir) = temp_store("access");
        let content = b"secret sauce";
        let asset_id = AssetId::derive(content);
        let creator = AccountId::from("acct_creator000000");
        let record = make_record(asset_id.clone(), creator.as_str(), 0.9, vec![]);
        store.publish(record, content).unwrap();

        assert_eq!(store.get_content_for(&asset_id, &creator).unwrap(), Some(content.to_vec()));
        let stranger = AccountId::from("acct_stranger00000");
        assert_eq!(store.get_content_for(&asset_id, &stranger).unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn query_sorts_by_confidence_descending_and_is_stable() {
        let (store, dir) = temp_store("query");
        for (bytes, conf) in [(&b"a"[..], 0.2), (&b"b"[..], 0.9), (&b"c"[..], 0.5)] {
            let asset_id = AssetId::derive(bytes);
            store.publish(make_record(asset_id, "acct_creator000000", conf, vec!["x"]), bytes).unwrap();
        }
        let results = store.query(&CapsuleFilter::default()).unwrap();
        let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.5, 0.2]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn search_is_case_insensitive() {
        let (store, dir) = temp_store("search");
        let content = b"rust parser";
        let asset_id = AssetId::derive(content);
        store.publish(make_record(asset_id, "acct_creator000000", 0.5, vec!["RUST"]), content).unwrap();
        assert_eq!(store.search("rust").unwrap().len(), 1);
        assert_eq!(store.search("RUST").unwrap().len(), 1);
        assert_eq!(store.search("golang").unwrap().len(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
