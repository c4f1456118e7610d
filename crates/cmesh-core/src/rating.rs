use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Per-node reputation record. `score` is derived and recomputed whenever
/// any of the other fields change; it is never independently mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub node_id: NodeId,
    /// Latency-based speed score, exponentially smoothed, clamped 0..10000.
    pub ewma: f64,
    pub completed: u64,
    pub failed: u64,
    pub likes: u64,
    pub score: i64,
}

impl RatingRecord {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id, ewma: 0.0, completed: 0, failed: 0, likes: 0, score: 0 }
    }

    /// `score = max(0, round(ewma + 2*completed + likes - 10*failed))`.
    pub fn recompute_score(&mut self) {
        let raw = self.ewma + 2.0 * self.completed as f64 + self.likes as f64
            - 10.0 * self.failed as f64;
        self.score = raw.round().max(0.0) as i64;
    }
}
