use std::collections::HashSet;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cmesh_bazaar::TaskBazaar;
use cmesh_core::{
    Bid, MeshResult, NodeId, Package, Task, TaskId, TaskStatus, Timestamp, BID_FRACTION_OF_BOUNTY,
};
use cmesh_rating::RatingEngine;
use tracing::{info, warn};

/// One action the worker wants taken: submit a bid, or report an outcome.
/// The worker never writes to the ledger or the bazaar directly (spec
/// §4.8) — the mesh coordinator applies these and broadcasts them.
#[derive(Debug, Clone)]
pub enum WorkerAction {
    Bid { task_id: TaskId, bid: Bid },
    Completed { task_id: TaskId, node_id: NodeId, result: String, package: Package },
    Failed { task_id: TaskId, node_id: NodeId },
}

/// Local auto-bidder and executor skeleton. Content generation is out of
/// scope (spec §1); on winning, this produces a placeholder deliverable
/// package so the `task_completed` message shape is real and testable.
pub struct TaskWorker {
    node_id: NodeId,
    /// Tasks already turned into a `Completed`/`Failed` action, so a
    /// repeated scan of the same assignment doesn't re-emit it.
    settled_once: Mutex<HashSet<TaskId>>,
}

impl TaskWorker {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id, settled_once: Mutex::new(HashSet::new()) }
    }

    /// Scan all `open` tasks and emit exactly one bid per eligible task
    /// this node hasn't already bid on. Eligibility requires
    /// `isDisqualified == false` (spec §4.6).
    pub fn scan_and_bid(&self, bazaar: &TaskBazaar, rating: &RatingEngine, now: Timestamp) -> MeshResult<Vec<WorkerAction>> {
        if rating.is_disqualified(&self.node_id)? {
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();
        for task in bazaar.all()? {
            if task.status != TaskStatus::Open {
                continue;
            }
            if task.has_bid_from(&self.node_id) {
                continue;
            }
            let amount = ((task.bounty.amount as f64) * BID_FRACTION_OF_BOUNTY).floor() as u128;
            let bid = Bid { node_id: self.node_id.clone(), amount, timestamp: now };
            info!(task_id = %task.task_id, amount, "bidding on open task");
            actions.push(WorkerAction::Bid { task_id: task.task_id, bid });
        }
        Ok(actions)
    }

    /// Scan `assigned` tasks won by this node and produce a completion
    /// action for each one not yet settled locally.
    pub fn process_assignments(&self, bazaar: &TaskBazaar) -> MeshResult<Vec<WorkerAction>> {
        let mut guard = self.settled_once.lock().unwrap();
        let mut actions = Vec::new();
        for task in bazaar.all()? {
            if task.status != TaskStatus::Assigned {
                continue;
            }
            if task.assigned_to.as_deref() != Some(self.node_id.as_str()) {
                continue;
            }
            if !guard.insert(task.task_id.clone()) {
                continue;
            }
            actions.push(self.complete(&task));
        }
        Ok(actions)
    }

    fn complete(&self, task: &Task) -> WorkerAction {
        WorkerAction::Completed {
            task_id: task.task_id.clone(),
            node_id: self.node_id.clone(),
            result: format!("completed task {}", task.task_id),
            package: placeholder_package(task),
        }
    }

    /// Mark a task this node was assigned but could not complete. Callers
    /// reach this only on an unrecoverable local error (spec §4.8); the
    /// worker never decides this on its own in the skeleton.
    pub fn report_failure(&self, task_id: &TaskId) -> WorkerAction {
        warn!(task_id = %task_id, node_id = %self.node_id, "reporting task failure");
        WorkerAction::Failed { task_id: task_id.clone(), node_id: self.node_id.clone() }
    }
}

/// A deterministic, empty placeholder package: real content synthesis is
/// out of scope, but the wire shape of `task_completed` is exercised end
/// to end.
fn placeholder_package(task: &Task) -> Package {
    Package {
        file_name: format!("{}.deliverable", task.task_id),
        size: 0,
        data: Some(BASE64.encode(b"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmesh_bazaar::TaskBazaar;
    use cmesh_core::{escrow_account_id, AccountId, Bounty};
    use cmesh_rating::RatingConfig;

    fn temp_bazaar(name: &str) -> (TaskBazaar, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cmesh_worker_bazaar_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (TaskBazaar::open(&dir).unwrap(), dir)
    }

    fn temp_rating(name: &str) -> (RatingEngine, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("cmesh_worker_rating_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (RatingEngine::open(&dir, RatingConfig::default()).unwrap(), dir)
    }

    fn open_task(publisher: &AccountId, published_at: Timestamp, bounty: u128) -> Task {
        let task_id = TaskId::derive("desc", publisher, published_at);
        let escrow = escrow_account_id(&task_id);
        let mut task = Task::new(
            task_id,
            "desc".into(),
            publisher.clone(),
            published_at,
            Bounty { amount: bounty, token: "mesh".into() },
            escrow,
            vec![],
        );
        task.status = TaskStatus::Open;
        task
    }

    #[test]
    fn bids_exactly_once_per_open_task() {
        let (bazaar, bdir) = temp_bazaar("once");
        let (rating, rdir) = temp_rating("once");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        let task = open_task(&publisher, 1_000, 1_000);
        bazaar.publish(task.clone()).unwrap();

        let worker = TaskWorker::new("node-w".to_string());
        let actions = worker.scan_and_bid(&bazaar, &rating, 2_000).unwrap();
        assert_eq!(actions.len(), 1);
        let WorkerAction::Bid { bid, .. } = &actions[0] else { panic!("expected bid action") };
        assert_eq!(bid.amount, 900);

        bazaar.record_bid(&task.task_id, bid.clone()).unwrap();
        let again = worker.scan_and_bid(&bazaar, &rating, 3_000).unwrap();
        assert!(again.is_empty(), "already bid, no second bid emitted");

        let _ = std::fs::remove_dir_all(&bdir);
        let _ = std::fs::remove_dir_all(&rdir);
    }

    #[test]
    fn disqualified_node_does_not_bid() {
        let (bazaar, bdir) = temp_bazaar("disqualified");
        let (rating, rdir) = temp_rating("disqualified");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        bazaar.publish(open_task(&publisher, 1_000, 1_000)).unwrap();

        // Disqualification requires completed >= min_tasks(10); meet that
        // with glacially slow completions (ewma rounds to zero) and then
        // push score below threshold=10 with a couple of failures.
        let node = "node-bad".to_string();
        for _ in 0..10 {
            rating.record_completion(&node, 100_000_000_000).unwrap();
        }
        for _ in 0..2 {
            rating.record_failure(&node).unwrap();
        }
        assert!(rating.is_disqualified(&node).unwrap());

        let worker = TaskWorker::new(node);
        let actions = worker.scan_and_bid(&bazaar, &rating, 2_000).unwrap();
        assert!(actions.is_empty());

        let _ = std::fs::remove_dir_all(&bdir);
        let _ = std::fs::remove_dir_all(&rdir);
    }

    #[test]
    fn node_below_min_tasks_is_not_disqualified_and_still_bids() {
        let (bazaar, bdir) = temp_bazaar("not_disqualified");
        let (rating, rdir) = temp_rating("not_disqualified");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        bazaar.publish(open_task(&publisher, 1_000, 1_000)).unwrap();

        // Well below min_tasks=10, so isDisqualified is false regardless of
        // how bad the score looks.
        let node = "node-new".to_string();
        for _ in 0..3 {
            rating.record_failure(&node).unwrap();
        }
        assert!(!rating.is_disqualified(&node).unwrap());

        let worker = TaskWorker::new(node);
        let actions = worker.scan_and_bid(&bazaar, &rating, 2_000).unwrap();
        assert_eq!(actions.len(), 1, "node below min_tasks is still eligible to bid");

        let _ = std::fs::remove_dir_all(&bdir);
        let _ = std::fs::remove_dir_all(&rdir);
    }

    #[test]
    fn completes_assigned_task_exactly_once() {
        let (bazaar, bdir) = temp_bazaar("complete");
        let publisher = AccountId::from("acct_pppppppppppppppp");
        let mut task = open_task(&publisher, 1_000, 1_000);
        task.status = TaskStatus::Assigned;
        task.assigned_to = Some("node-w".into());
        bazaar.publish(task.clone()).unwrap();

        let worker = TaskWorker::new("node-w".to_string());
        let actions = worker.process_assignments(&bazaar).unwrap();
        assert_eq!(actions.len(), 1);

        let again = worker.process_assignments(&bazaar).unwrap();
        assert!(again.is_empty(), "already settled locally, no repeat completion");

        let _ = std::fs::remove_dir_all(&bdir);
    }
}
