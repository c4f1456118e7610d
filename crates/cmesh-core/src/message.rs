use serde::{Deserialize, Serialize};

use crate::capsule::CapsuleRecord;
use crate::task::{Bid, Task};
use crate::transaction::{LogEntry, Transaction};
use crate::types::{AccountId, NodeId, Seq, TaskId, Timestamp};

/// Deliverable package produced by a worker for a won task. `data` is a
/// base64-encoded archive payload; content generation itself is out of
/// scope (spec §1) so workers emit a placeholder payload with a real shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub file_name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// One payload variant per gossip message kind named in spec §4.3/§6. The
/// `type` tag on the wire drives which variant is decoded; unknown tags
/// are dropped before ever reaching this enum (see `cmesh-p2p::framing`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GossipPayload {
    Handshake {
        node_id: NodeId,
        port: u16,
    },
    Ping {
        timestamp: Timestamp,
        ping_id: String,
    },
    Pong {
        timestamp: Timestamp,
        ping_id: String,
    },
    Capsule {
        capsule: CapsuleRecord,
        content_hash: String,
    },
    Task {
        task: Task,
    },
    TaskBid {
        task_id: TaskId,
        bid: Bid,
    },
    TaskAssigned {
        task_id: TaskId,
        assigned_to: NodeId,
        assigned_at: Timestamp,
    },
    TaskCompleted {
        task_id: TaskId,
        node_id: NodeId,
        result: String,
        package: Package,
    },
    TaskFailed {
        task_id: TaskId,
        node_id: NodeId,
    },
    TaskLike {
        task_id: TaskId,
        winner_node_id: NodeId,
        liked_by: NodeId,
    },
    Tx {
        tx: Transaction,
    },
    TxLog {
        entry: LogEntry,
    },
    TxLogRequest {
        since_seq: Seq,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    TxLogBatch {
        entries: Vec<LogEntry>,
        last_seq: Seq,
        has_more: bool,
    },
    LedgerHeadRequest {},
    LedgerHeadResponse {
        last_seq: Seq,
        leader_account: Option<AccountId>,
    },
    Query {
        query_id: String,
        kind: String,
    },
    QueryResponse {
        query_id: String,
        body: serde_json::Value,
    },
}

impl GossipPayload {
    /// Message kinds exempt from relay per spec §4.3: handshake, ping/pong,
    /// query, query_response are point-to-point or connection-scoped.
    pub fn is_relayable(&self) -> bool {
        !matches!(
            self,
            GossipPayload::Handshake { .. }
                | GossipPayload::Ping { .. }
                | GossipPayload::Pong { .. }
                | GossipPayload::Query { .. }
                | GossipPayload::QueryResponse { .. }
        )
    }

    /// Task-related messages use the higher task fanout/hop defaults.
    pub fn is_task_kind(&self) -> bool {
        matches!(
            self,
            GossipPayload::Task { .. }
                | GossipPayload::TaskBid { .. }
                | GossipPayload::TaskAssigned { .. }
                | GossipPayload::TaskCompleted { .. }
                | GossipPayload::TaskFailed { .. }
                | GossipPayload::TaskLike { .. }
        )
    }
}
