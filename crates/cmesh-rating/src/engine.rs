use std::path::Path;

use cmesh_core::{MeshError, MeshResult, NodeId, RatingRecord, TaskId};
use tracing::debug;

fn storage_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Storage(e.to_string())
}
fn ser_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Serialization(e.to_string())
}

/// Tunables behind `recordCompletion`/`isDisqualified`, spec §4.5 defaults.
#[derive(Debug, Clone, Copy)]
pub struct RatingConfig {
    pub alpha: f64,
    pub target_ms: u64,
    pub min_tasks: u64,
    pub threshold: i64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            target_ms: 30 * 60 * 1000,
            min_tasks: 10,
            threshold: 10,
        }
    }
}

/// Per-node reputation, backed by sled so it survives restarts. `likes` is
/// a membership set over `task_id` alone: at most one like is ever
/// recorded per task, regardless of who liked it or who won.
pub struct RatingEngine {
    _db: sled::Db,
    ratings: sled::Tree,
    likes: sled::Tree,
    config: RatingConfig,
}

impl RatingEngine {
    pub fn open<P: AsRef<Path>>(path: P, config: RatingConfig) -> MeshResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let ratings = db.open_tree("ratings").map_err(storage_err)?;
        let likes = db.open_tree("likes").map_err(storage_err)?;
        Ok(Self { _db: db, ratings, likes, config })
    }

    pub fn get(&self, node_id: &str) -> MeshResult<RatingRecord> {
        match self.ratings.get(node_id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => bincode::deserialize(&bytes).map_err(ser_err),
            None => Ok(RatingRecord::new(node_id.to_string())),
        }
    }

    fn put(&self, record: &RatingRecord) -> MeshResult<()> {
        let bytes = bincode::serialize(record).map_err(ser_err)?;
        self.ratings.insert(record.node_id.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    /// `speedScore = clamp(round(targetMs/durationMs * 10000), 0, 10000)`,
    /// folded into `ewma` (first sample seeds it directly).
    pub fn record_completion(&self, node_id: &NodeId, duration_ms: u64) -> MeshResult<RatingRecord> {
        let mut record = self.get(node_id)?;
        let duration_ms = duration_ms.max(1);
        let speed_score = ((self.config.target_ms as f64 / duration_ms as f64) * 10000.0)
            .round()
            .clamp(0.0, 10000.0);

        record.ewma = if record.completed == 0 && record.failed == 0 {
            speed_score
        } else {
            self.config.alpha * speed_score + (1.0 - self.config.alpha) * record.ewma
        };
        record.completed += 1;
        record.recompute_score();
        self.put(&record)?;
        debug!(node_id = %node_id, ewma = record.ewma, score = record.score, "recorded completion");
        Ok(record)
    }

    pub fn record_failure(&self, node_id: &NodeId) -> MeshResult<RatingRecord> {
        let mut record = self.get(node_id)?;
        record.failed += 1;
        record.recompute_score();
        self.put(&record)?;
        debug!(node_id = %node_id, score = record.score, "recorded failure");
        Ok(record)
    }

    /// Succeeds only if no prior like exists for `task_id`; returns `false`
    /// on the idempotent no-op path (spec §4.6 "like" self-transition).
    pub fn add_like(
        &self,
        task_id: &TaskId,
        winner_node_id: &NodeId,
        _liked_by_node_id: &NodeId,
    ) -> MeshResult<bool> {
        let key = task_id.as_str().as_bytes();
        let inserted = self
            .likes
            .compare_and_swap(key, None::<&[u8]>, Some(b"".as_ref()))
            .map_err(storage_err)?
            .is_ok();
        if !inserted {
            return Ok(false);
        }

        let mut record = self.get(winner_node_id)?;
        record.likes += 1;
        record.recompute_score();
        self.put(&record)?;
        Ok(true)
    }

    /// True iff `completed >= minTasks` and `score < threshold`.
    pub fn is_disqualified(&self, node_id: &str) -> MeshResult<bool> {
        let record = self.get(node_id)?;
        Ok(record.completed >= self.config.min_tasks && record.score < self.config.threshold)
    }

    pub fn flush(&self) -> MeshResult<()> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_engine(name: &str) -> (RatingEngine, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cmesh_rating_test_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (RatingEngine::open(&dir, RatingConfig::default()).unwrap(), dir)
    }

    #[test]
    fn first_completion_seeds_ewma_directly() {
        let (engine, dir) = temp_engine("seed");
        let record = engine.record_completion(&"node-a".to_string(), 30 * 60 * 1000).unwrap();
        assert_eq!(record.completed, 1);
        assert!((record.ewma - 10000.0).abs() < 1.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn subsequent_completion_blends_ewma() {
        let (engine, dir) = temp_engine("blend");
        let node = "node-b".to_string();
        engine.record_completion(&node, 30 * 60 * 1000).unwrap();
        let record = engine.record_completion(&node, 60 * 60 * 1000).unwrap();
        // second sample is slower (half speed score): ewma should sit
        // strictly between the two raw speed scores.
        assert!(record.ewma < 10000.0);
        assert!(record.ewma > 5000.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failure_lowers_score() {
        let (engine, dir) = temp_engine("failure");
        let node = "node-c".to_string();
        engine.record_completion(&node, 30 * 60 * 1000).unwrap();
        let before = engine.get(&node).unwrap().score;
        let after = engine.record_failure(&node).unwrap().score;
        assert!(after < before);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn like_is_recorded_once_per_task() {
        let (engine, dir) = temp_engine("like");
        let task_id = TaskId::derive("desc", &cmesh_core::AccountId::from("acct_0000000000000000"), 1);
        let winner = "node-d".to_string();
        let liker = "node-e".to_string();
        assert!(engine.add_like(&task_id, &winner, &liker).unwrap());
        assert!(!engine.add_like(&task_id, &winner, &liker).unwrap());
        assert_eq!(engine.get(&winner).unwrap().likes, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn disqualification_requires_minimum_tasks_and_low_score() {
        let (engine, dir) = temp_engine("disqualify");
        let node = "node-f".to_string();
        // Meet min_tasks=10 with glacially slow completions so ewma rounds to
        // zero, then a couple of failures push score below threshold=10.
        for _ in 0..10 {
            engine.record_completion(&node, 100_000_000_000).unwrap();
        }
        for _ in 0..2 {
            engine.record_failure(&node).unwrap();
        }
        let record = engine.get(&node).unwrap();
        assert_eq!(record.completed, 10);
        assert!(engine.is_disqualified(&node).unwrap());

        let fresh_node = "node-g".to_string();
        engine.record_failure(&fresh_node).unwrap();
        assert!(
            !engine.is_disqualified(&fresh_node).unwrap(),
            "below min_tasks, never disqualified regardless of score"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
