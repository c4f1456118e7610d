use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Balance, NodeId, Seq, TaskId, Timestamp};

/// Task lifecycle state. Transitions are one-directional except for the
/// `completed -> completed` idempotent `like` self-loop (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    PendingEscrow,
    Open,
    Voting,
    Assigned,
    Completed,
    Failed,
}

/// The bounty carried by a task: a flat amount in a named token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounty {
    pub amount: Balance,
    pub token: String,
}

/// One bid against a task. At most one per `(taskId, nodeId)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub node_id: NodeId,
    pub amount: Balance,
    pub timestamp: Timestamp,
}

/// A bounty-carrying work item, from publish through settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub description: String,
    pub publisher: AccountId,
    pub published_at: Timestamp,
    pub bounty: Bounty,
    pub escrow_account_id: AccountId,
    pub tags: Vec<String>,
    pub status: TaskStatus,
    pub bids: Vec<Bid>,

    pub voting_started_at: Option<Timestamp>,
    pub assigned_to: Option<NodeId>,
    pub assigned_at: Option<Timestamp>,
    pub completed_by: Option<NodeId>,
    pub completed_at: Option<Timestamp>,
    pub result: Option<String>,

    /// Seq of the escrow-funding transfer, once observed; used so the
    /// `pending_escrow -> open` scan doesn't re-evaluate already-funded
    /// tasks against every ledger advance.
    pub escrow_funded_seq: Option<Seq>,
}

impl Task {
    pub fn new(
        task_id: TaskId,
        description: String,
        publisher: AccountId,
        published_at: Timestamp,
        bounty: Bounty,
        escrow_account_id: AccountId,
        tags: Vec<String>,
    ) -> Self {
        Self {
            task_id,
            description,
            publisher,
            published_at,
            bounty,
            escrow_account_id,
            tags,
            status: TaskStatus::PendingEscrow,
            bids: Vec::new(),
            voting_started_at: None,
            assigned_to: None,
            assigned_at: None,
            completed_by: None,
            completed_at: None,
            result: None,
            escrow_funded_seq: None,
        }
    }

    pub fn has_bid_from(&self, node_id: &str) -> bool {
        self.bids.iter().any(|b| b.node_id == node_id)
    }

    /// Deterministic winner selection: sort `(amount asc, timestamp asc)`,
    /// first wins. Identical on every node so silent-publisher observers
    /// agree on the outcome (spec §4.6).
    pub fn select_winner(&self) -> Option<&Bid> {
        self.bids
            .iter()
            .min_by(|a, b| (a.amount, a.timestamp).cmp(&(b.amount, b.timestamp)))
    }
}
