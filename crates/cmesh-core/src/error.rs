use thiserror::Error;

/// Closed error taxonomy for the mesh core. One variant per rejection reason
/// named in the ledger, bazaar, capsule store, and gossip transport.
#[derive(Debug, Error)]
pub enum MeshError {
    // ── Transaction validation (ledger) ──────────────────────────────────────
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("bad signature")]
    BadSignature,

    #[error("signer public key does not hash to `from` account")]
    FromMismatch,

    #[error("bad nonce: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u128, have: u128 },

    #[error("bad amount: must be positive, got {0}")]
    BadAmount(u128),

    #[error("only the leader may sign this transaction type")]
    NotLeader,

    #[error("bad escrow account: {0}")]
    BadEscrowAccount(String),

    #[error("duplicate transaction id: {0}")]
    DuplicateTx(String),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("mint accepted only as the genesis record on an empty log")]
    MintNotGenesis,

    // ── Ledger ordering ───────────────────────────────────────────────────────
    #[error("entry out of order: expected seq {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    // ── Task bazaar ───────────────────────────────────────────────────────────
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task is not open for bidding: {0}")]
    TaskNotOpen(String),

    #[error("duplicate bid for task {task_id} from node {node_id}")]
    DuplicateBid { task_id: String, node_id: String },

    // ── Capsule store ─────────────────────────────────────────────────────────
    #[error("capsule not found: {0}")]
    CapsuleNotFound(String),

    #[error("asset id mismatch: recomputed {recomputed}, stored {stored}")]
    AssetIdMismatch { recomputed: String, stored: String },

    // ── Wallet / key material ─────────────────────────────────────────────────
    #[error("bad key material: {0}")]
    BadKeyMaterial(String),

    // ── Infrastructure ────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

pub type MeshResult<T> = Result<T, MeshError>;
