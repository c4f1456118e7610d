pub mod account;
pub mod capsule;
pub mod constants;
pub mod error;
pub mod message;
pub mod rating;
pub mod task;
pub mod transaction;
pub mod types;

pub use account::Account;
pub use capsule::{Attribution, CapsuleFilter, CapsuleRecord, CapsuleStatus, Price};
pub use constants::*;
pub use error::{MeshError, MeshResult};
pub use message::{GossipPayload, Package};
pub use rating::RatingRecord;
pub use task::{Bid, Bounty, Task, TaskStatus};
pub use transaction::{CanonicalPayload, LogEntry, Transaction, TxType};
pub use types::{
    escrow_account_id, AccountId, AssetId, Balance, NodeId, Nonce, Seq, TaskId, Timestamp, TxId,
};
