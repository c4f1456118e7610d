use std::path::Path;

use cmesh_core::{
    Bid, MeshError, MeshResult, NodeId, Task, TaskId, TaskStatus, Timestamp, VOTING_WINDOW_SECS,
};
use cmesh_ledger::LedgerEngine;
use tracing::{debug, info, warn};

use crate::store::TaskStore;

/// Task lifecycle FSM (spec §4.6): `pending_escrow -> open -> voting ->
/// assigned -> completed|failed`, plus the idempotent `completed -> completed`
/// like self-loop (handled by `cmesh-rating`, not here).
pub struct TaskBazaar {
    store: TaskStore,
}

impl TaskBazaar {
    pub fn open<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        Ok(Self { store: TaskStore::open(path)? })
    }

    pub fn get(&self, task_id: &TaskId) -> MeshResult<Option<Task>> {
        self.store.get(task_id)
    }

    pub fn all(&self) -> MeshResult<Vec<Task>> {
        self.store.all()
    }

    /// Publish a newly created task, persisted with status `pending_escrow`
    /// (set by `Task::new`).
    pub fn publish(&self, task: Task) -> MeshResult<Task> {
        self.store.put(&task)?;
        info!(task_id = %task.task_id, bounty = task.bounty.amount, "task published");
        Ok(task)
    }

    /// Store a task published by a remote peer. Idempotent on `task_id` —
    /// this node's own view of the task's lifecycle always wins once it has
    /// one.
    pub fn receive_remote(&self, task: Task) -> MeshResult<()> {
        if self.store.get(&task.task_id)?.is_some() {
            return Ok(());
        }
        self.store.put(&task)
    }

    /// Rehydrate on startup: loads every task from storage. Tasks already
    /// `completed`/`failed` are left exactly as stored — no settlement side
    /// effect (escrow release, rating hook) is re-run for them.
    pub fn rehydrate(&self) -> MeshResult<usize> {
        let tasks = self.store.all()?;
        info!(count = tasks.len(), "bazaar rehydrated tasks from storage");
        Ok(tasks.len())
    }

    /// Promote every `pending_escrow` task whose escrow account balance has
    /// reached the bounty to `open`. Called after every ledger advance.
    pub fn scan_pending_escrow(&self, ledger: &LedgerEngine) -> MeshResult<Vec<TaskId>> {
        let mut promoted = Vec::new();
        for mut task in self.store.with_status(TaskStatus::PendingEscrow)? {
            if task.escrow_funded_seq.is_some() {
                continue;
            }
            let balance = ledger.balance(&task.escrow_account_id);
            if balance >= task.bounty.amount {
                task.status = TaskStatus::Open;
                task.escrow_funded_seq = Some(ledger.last_seq());
                self.store.put(&task)?;
                debug!(task_id = %task.task_id, "escrow funded, task opened for bidding");
                promoted.push(task.task_id);
            }
        }
        Ok(promoted)
    }

    /// Append a bid to an `open` or `voting` task. Rejects duplicates for
    /// `(task_id, node_id)`. The first bid moves the task to `voting` and
    /// records `voting_started_at`; returns `true` when that happens.
    pub fn record_bid(&self, task_id: &TaskId, bid: Bid) -> MeshResult<bool> {
        let mut task = self
            .store
            .get(task_id)?
            .ok_or_else(|| MeshError::TaskNotFound(task_id.to_string()))?;

        if !matches!(task.status, TaskStatus::Open | TaskStatus::Voting) {
            return Err(MeshError::TaskNotOpen(task_id.to_string()));
        }
        if task.has_bid_from(&bid.node_id) {
            return Err(MeshError::DuplicateBid {
                task_id: task_id.to_string(),
                node_id: bid.node_id,
            });
        }

        let is_first_bid = task.status == TaskStatus::Open;
        if is_first_bid {
            task.status = TaskStatus::Voting;
            task.voting_started_at = Some(bid.timestamp);
        }
        task.bids.push(bid);
        self.store.put(&task)?;
        Ok(is_first_bid)
    }

    /// Tasks whose voting window has elapsed and are ready for winner
    /// selection. The caller (the mesh coordinator) only finalizes these
    /// for tasks this node published.
    pub fn tasks_ready_for_selection(&self, now: Timestamp) -> MeshResult<Vec<TaskId>> {
        let window_ms = (VOTING_WINDOW_SECS * 1000) as Timestamp;
        let ready = self
            .store
            .with_status(TaskStatus::Voting)?
            .into_iter()
            .filter(|t| t.voting_started_at.map(|at| now - at >= window_ms).unwrap_or(false))
            .map(|t| t.task_id)
            .collect();
        Ok(ready)
    }

    /// Deterministic winner selection: sort bids `(amount asc, timestamp
    /// asc)`, first wins. Identical on every node, so observers agree on
    /// the outcome even if the publisher goes silent (spec §4.6).
    pub fn select_winner(&self, task_id: &TaskId, now: Timestamp) -> MeshResult<Bid> {
        let mut task = self
            .store
            .get(task_id)?
            .ok_or_else(|| MeshError::TaskNotFound(task_id.to_string()))?;

        let winner = task
            .select_winner()
            .cloned()
            .ok_or_else(|| MeshError::TaskNotFound(format!("{task_id} has no bids")))?;

        task.status = TaskStatus::Assigned;
        task.assigned_to = Some(winner.node_id.clone());
        task.assigned_at = Some(now);
        self.store.put(&task)?;
        info!(task_id = %task_id, winner = %winner.node_id, "task assigned");
        Ok(winner)
    }

    /// Apply a `task_assigned` broadcast observed from the publisher.
    /// No-op if this node already moved the task past `voting`.
    pub fn record_assigned(&self, task_id: &TaskId, assigned_to: NodeId, assigned_at: Timestamp) -> MeshResult<()> {
        let mut task = self
            .store
            .get(task_id)?
            .ok_or_else(|| MeshError::TaskNotFound(task_id.to_string()))?;

        if matches!(task.status, TaskStatus::Assigned | TaskStatus::Completed | TaskStatus::Failed) {
            return Ok(());
        }
        task.status = TaskStatus::Assigned;
        task.assigned_to = Some(assigned_to);
        task.assigned_at = Some(assigned_at);
        self.store.put(&task)
    }

    /// Settlement: move an `assigned` task to `completed`.
    pub fn record_completion(
        &self,
        task_id: &TaskId,
        completed_by: NodeId,
        completed_at: Timestamp,
        result: String,
    ) -> MeshResult<Task> {
        let mut task = self
            .store
            .get(task_id)?
            .ok_or_else(|| MeshError::TaskNotFound(task_id.to_string()))?;

        if task.status == TaskStatus::Completed {
            return Ok(task);
        }
        task.status = TaskStatus::Completed;
        task.completed_by = Some(completed_by);
        task.completed_at = Some(completed_at);
        task.result = Some(result);
        self.store.put(&task)?;
        info!(task_id = %task_id, "task completed");
        Ok(task)
    }

    pub fn record_failure(&self, task_id: &TaskId, node_id: &str) -> MeshResult<Task> {
        let mut task = self
            .store
            .get(task_id)?
            .ok_or_else(|| MeshError::TaskNotFound(task_id.to_string()))?;

        task.status = TaskStatus::Failed;
        self.store.put(&task)?;
        warn!(task_id = %task_id, node_id = %node_id, "task failed");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmesh_core::{escrow_account_id, AccountId, Bounty};
    use cmesh_ledger::{LedgerMode, StateDb};
    use cmesh_crypto::KeyPair;
    use std::sync::Arc;

    fn temp_bazaar(name: &str) -> (TaskBazaar, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cmesh_bazaar_test_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (TaskBazaar::open(&dir).unwrap(), dir)
    }

    fn sample_task(publisher: &AccountId, published_at: Timestamp) -> Task {
        let task_id = TaskId::derive("do a thing", publisher, published_at);
        let escrow = escrow_account_id(&task_id);
        Task::new(
            task_id,
            "do a thing".into(),
            publisher.clone(),
            published_at,
            Bounty { amount: 1000, token: "mesh".into() },
            escrow,
            vec!["rust".into()],
        )
    }

    #[test]
    fn scan_promotes_pending_escrow_once_funded() {
        let (bazaar, dir) = temp_bazaar("escrow");
        let ledger_dir = std::env::temp_dir().join(format!("cmesh_bazaar_ledger_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&ledger_dir);
        let db = Arc::new(StateDb::open(&ledger_dir).unwrap());
        let ledger = LedgerEngine::open(db, LedgerMode::Leader);
        let leader = KeyPair::generate();
        ledger.initialize(&leader, 1_000_000).unwrap();

        let publisher = leader.account_id.clone();
        let task = sample_task(&publisher, 1_000);
        let escrow_account = task.escrow_account_id.clone();
        bazaar.publish(task.clone()).unwrap();

        let promoted = bazaar.scan_pending_escrow(&ledger).unwrap();
        assert!(promoted.is_empty(), "escrow not funded yet");

        let tx = cmesh_crypto::build_signed_transaction(
            &leader, cmesh_core::TxType::Transfer, publisher, escrow_account, 1000, 2, 2_000,
        );
        ledger.submit_local_as_leader(tx).unwrap();

        let promoted = bazaar.scan_pending_escrow(&ledger).unwrap();
        assert_eq!(promoted, vec![task.task_id.clone()]);
        assert_eq!(bazaar.get(&task.task_id).unwrap().unwrap().status, TaskStatus::Open);

        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_dir_all(&ledger_dir);
    }

    #[test]
    fn first_bid_moves_task_to_voting_and_duplicates_are_rejected() {
        let (bazaar, dir) = temp_bazaar("bidding");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        let mut task = sample_task(&publisher, 1_000);
        task.status = TaskStatus::Open;
        bazaar.publish(task.clone()).unwrap();

        let first = bazaar
            .record_bid(&task.task_id, Bid { node_id: "node-a".into(), amount: 900, timestamp: 1_500 })
            .unwrap();
        assert!(first);
        assert_eq!(bazaar.get(&task.task_id).unwrap().unwrap().status, TaskStatus::Voting);

        let second = bazaar
            .record_bid(&task.task_id, Bid { node_id: "node-b".into(), amount: 850, timestamp: 1_600 })
            .unwrap();
        assert!(!second, "second bid does not re-trigger the voting transition");

        let err = bazaar
            .record_bid(&task.task_id, Bid { node_id: "node-a".into(), amount: 800, timestamp: 1_700 })
            .unwrap_err();
        assert!(matches!(err, MeshError::DuplicateBid { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn winner_selection_is_deterministic_by_amount_then_timestamp() {
        let (bazaar, dir) = temp_bazaar("winner");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        let mut task = sample_task(&publisher, 1_000);
        task.status = TaskStatus::Open;
        bazaar.publish(task.clone()).unwrap();

        bazaar
            .record_bid(&task.task_id, Bid { node_id: "node-slow-cheap".into(), amount: 800, timestamp: 2_000 })
            .unwrap();
        bazaar
            .record_bid(&task.task_id, Bid { node_id: "node-fast-cheap".into(), amount: 800, timestamp: 1_000 })
            .unwrap();
        bazaar
            .record_bid(&task.task_id, Bid { node_id: "node-expensive".into(), amount: 950, timestamp: 500 })
            .unwrap();

        let winner = bazaar.select_winner(&task.task_id, 10_000).unwrap();
        assert_eq!(winner.node_id, "node-fast-cheap");

        let settled = bazaar.get(&task.task_id).unwrap().unwrap();
        assert_eq!(settled.status, TaskStatus::Assigned);
        assert_eq!(settled.assigned_to, Some("node-fast-cheap".to_string()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn completion_is_idempotent() {
        let (bazaar, dir) = temp_bazaar("completion");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        let mut task = sample_task(&publisher, 1_000);
        task.status = TaskStatus::Assigned;
        task.assigned_to = Some("node-a".into());
        bazaar.publish(task.clone()).unwrap();

        bazaar.record_completion(&task.task_id, "node-a".into(), 5_000, "done".into()).unwrap();
        let again = bazaar.record_completion(&task.task_id, "node-a".into(), 9_999, "done again".into()).unwrap();
        assert_eq!(again.completed_at, Some(5_000), "completion does not overwrite once settled");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
