use cmesh_core::constants::{
    F_DEFAULT, F_TASK, HEARTBEAT_INTERVAL_SECS, HOPS_DEFAULT, HOPS_TASK, PING_TIMEOUT_SECS,
    SEEN_SET_CAPACITY, SEEN_SET_TTL_SECS,
};

/// Configuration for the capsulemesh gossip transport.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local TCP listen address, e.g. "0.0.0.0:7777".
    pub listen_addr: String,
    /// Bootstrap peer addresses dialed on startup.
    pub bootstrap_peers: Vec<String>,
    /// Fanout for non-task messages.
    pub fanout_default: usize,
    /// Fanout for task-related messages.
    pub fanout_task: usize,
    /// Default `hopsLeft` for non-task messages.
    pub hops_default: u32,
    /// Default `hopsLeft` for task-related messages.
    pub hops_task: u32,
    pub heartbeat_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub seen_set_capacity: usize,
    pub seen_set_ttl_secs: u64,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7777".into(),
            bootstrap_peers: Vec::new(),
            fanout_default: F_DEFAULT,
            fanout_task: F_TASK,
            hops_default: HOPS_DEFAULT,
            hops_task: HOPS_TASK,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            ping_timeout_secs: PING_TIMEOUT_SECS,
            seen_set_capacity: SEEN_SET_CAPACITY,
            seen_set_ttl_secs: SEEN_SET_TTL_SECS,
        }
    }
}
