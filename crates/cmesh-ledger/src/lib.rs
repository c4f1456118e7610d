//! cmesh-ledger
//!
//! The signed, leader-ordered transaction log: sled-backed storage plus the
//! validation/apply engine, leader and follower modes, confirmations.

pub mod db;
pub mod engine;

pub use db::StateDb;
pub use engine::{LedgerEngine, LedgerMode};
