//! Protocol constants named by the specification. Tunable copies of these
//! live in `cmesh-coordinator::MeshConfig`; these are the hard defaults
//! referenced by tests and by `MeshConfig::default()`.

/// Default gossip fanout for non-task messages.
pub const F_DEFAULT: usize = 6;
/// Default gossip fanout for task-related messages.
pub const F_TASK: usize = 8;

/// Default hop count (`hopsLeft`) for non-task messages.
pub const HOPS_DEFAULT: u32 = 3;
/// Default hop count (`hopsLeft`) for task-related messages.
pub const HOPS_TASK: u32 = 4;

/// Heartbeat period between pings to each live peer.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
/// Pending pings older than this are discarded without RTT penalty.
pub const PING_TIMEOUT_SECS: u64 = 15;

/// Default seen-set (message dedup LRU) capacity.
pub const SEEN_SET_CAPACITY: usize = 8192;
/// Default seen-set entry time-to-live.
pub const SEEN_SET_TTL_SECS: u64 = 300;

/// Bazaar voting window: time from first bid to winner selection.
pub const VOTING_WINDOW_SECS: u64 = 5;

/// Auto-bidder polling cadence for open tasks.
pub const BID_SCAN_INTERVAL_SECS: u64 = 10;
/// Voting-result scanner cadence.
pub const VOTE_SCAN_INTERVAL_SECS: u64 = 5;

/// `waitForConfirmations` poll interval.
pub const CONFIRMATION_POLL_INTERVAL_MS: u64 = 200;
/// Default confirmation target for publish/purchase actions.
pub const DEFAULT_CONFIRMATION_TARGET: u64 = 1;
/// Default timeout for `waitForConfirmations` / `waitForPlatformAccount`.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 10;

/// Follower pending-tx re-broadcast: initial delay and cap.
pub const REBROADCAST_INITIAL_SECS: u64 = 2;
pub const REBROADCAST_MAX_SECS: u64 = 15;

/// Follower incremental ledger-sync cadence.
pub const LEDGER_SYNC_INTERVAL_SECS: u64 = 10;
/// Follower forced full resync cadence (recovers from silent divergence).
pub const LEDGER_FULL_RESYNC_INTERVAL_SECS: u64 = 60;

/// Rating EWMA smoothing factor.
pub const RATING_ALPHA: f64 = 0.2;
/// Rating target completion time (milliseconds) for a "perfect" speed score.
pub const RATING_TARGET_MS: i64 = 30 * 60 * 1000;
/// Minimum completed tasks before a node can be disqualified on score alone.
pub const RATING_MIN_TASKS: u64 = 10;
/// Score floor below which a qualifying node is disqualified from bidding.
pub const RATING_DISQUALIFY_THRESHOLD: i64 = 10;

/// Auto-bidder bid amount as a fraction of bounty (floor(0.9 * bounty)).
pub const BID_FRACTION_OF_BOUNTY: f64 = 0.9;

/// Default `limit` applied to `entriesSince` when the caller passes none.
pub const DEFAULT_LOG_BATCH_LIMIT: usize = 256;
