//! cmesh-worker
//!
//! Local auto-bidder and executor skeleton: bids on eligible open tasks,
//! and on winning emits a placeholder deliverable package. Never writes to
//! the ledger or the bazaar directly — the mesh coordinator applies and
//! broadcasts every `WorkerAction`.

pub mod engine;

pub use engine::{TaskWorker, WorkerAction};
