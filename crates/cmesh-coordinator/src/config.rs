use std::path::PathBuf;

use cmesh_core::{
    AccountId, Balance, BID_FRACTION_OF_BOUNTY, BID_SCAN_INTERVAL_SECS, CONFIRMATION_POLL_INTERVAL_MS,
    DEFAULT_CONFIRMATION_TARGET, DEFAULT_CONFIRMATION_TIMEOUT_SECS, LEDGER_FULL_RESYNC_INTERVAL_SECS,
    LEDGER_SYNC_INTERVAL_SECS, REBROADCAST_INITIAL_SECS, REBROADCAST_MAX_SECS, VOTE_SCAN_INTERVAL_SECS,
    VOTING_WINDOW_SECS,
};
use cmesh_p2p::P2pConfig;
use cmesh_rating::RatingConfig;

/// Every tunable named as a constant or default across the specification,
/// collected in one place and wired from CLI flags in `cmesh-node`
/// (mirroring the teacher's `Args` + per-component config struct split).
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub data_dir: PathBuf,
    pub p2p: P2pConfig,
    pub rating: RatingConfig,

    /// Genesis mint amount, applied once by the leader on a fresh ledger.
    pub genesis_supply: Balance,
    /// Where `publishCapsule`/`publishTask` fee transfers and capsule
    /// purchase platform shares are routed.
    pub platform_account: AccountId,
    /// Flat fee deducted by `publishCapsule`; `0` disables the fee transfer.
    pub capsule_publish_fee: Balance,
    /// Flat fee deducted by `publishTask`, separate from the bounty escrow.
    pub task_publish_fee: Balance,

    pub confirmation_target: u64,
    pub confirmation_timeout_secs: u64,
    pub confirmation_poll_interval_ms: u64,

    pub voting_window_secs: u64,
    pub bid_scan_interval_secs: u64,
    pub vote_scan_interval_secs: u64,
    pub bid_fraction_of_bounty: f64,

    pub ledger_sync_interval_secs: u64,
    pub ledger_full_resync_interval_secs: u64,
    pub rebroadcast_initial_secs: u64,
    pub rebroadcast_max_secs: u64,
}

impl MeshConfig {
    /// Defaults matching the spec, parameterized only by the two things a
    /// deployment must choose itself: where to store state, and who the
    /// platform account is.
    pub fn new(data_dir: PathBuf, platform_account: AccountId) -> Self {
        Self {
            data_dir,
            p2p: P2pConfig::default(),
            rating: RatingConfig::default(),
            genesis_supply: 1_000_000_000,
            platform_account,
            capsule_publish_fee: 10,
            task_publish_fee: 0,
            confirmation_target: DEFAULT_CONFIRMATION_TARGET,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            confirmation_poll_interval_ms: CONFIRMATION_POLL_INTERVAL_MS,
            voting_window_secs: VOTING_WINDOW_SECS,
            bid_scan_interval_secs: BID_SCAN_INTERVAL_SECS,
            vote_scan_interval_secs: VOTE_SCAN_INTERVAL_SECS,
            bid_fraction_of_bounty: BID_FRACTION_OF_BOUNTY,
            ledger_sync_interval_secs: LEDGER_SYNC_INTERVAL_SECS,
            ledger_full_resync_interval_secs: LEDGER_FULL_RESYNC_INTERVAL_SECS,
            rebroadcast_initial_secs: REBROADCAST_INITIAL_SECS,
            rebroadcast_max_secs: REBROADCAST_MAX_SECS,
        }
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }
    pub fn capsule_dir(&self) -> PathBuf {
        self.data_dir.join("capsules")
    }
    pub fn rating_dir(&self) -> PathBuf {
        self.data_dir.join("ratings")
    }
    pub fn bazaar_dir(&self) -> PathBuf {
        self.data_dir.join("tasks")
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(".cmesh"), AccountId::from("acct_platform0000000"))
    }
}
