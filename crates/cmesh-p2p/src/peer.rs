use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use cmesh_core::NodeId;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// Outbound queue for one peer connection; the writer task owns the other
/// end and serializes writes to the socket.
pub type PeerSender = mpsc::Sender<Envelope>;

/// What the gossip layer knows about one peer connection.
pub struct PeerInfo {
    pub node_id: NodeId,
    pub addr: String,
    pub sender: PeerSender,
    pub rtt_ms: Option<u64>,
    pub last_seen: Instant,
    /// `pingId -> sent_at`, pruned by the heartbeat worker after
    /// `ping_timeout_secs` without penalizing RTT (spec §4.3).
    pub pending_pings: HashMap<String, Instant>,
}

impl PeerInfo {
    pub fn new(node_id: NodeId, addr: String, sender: PeerSender) -> Self {
        Self {
            node_id,
            addr,
            sender,
            rtt_ms: None,
            last_seen: Instant::now(),
            pending_pings: HashMap::new(),
        }
    }
}

/// Guarded by a single `tokio::sync::RwLock` per spec §5 ("per-structure
/// locks; peer disconnection is idempotent").
pub struct PeerTable {
    peers: tokio::sync::RwLock<HashMap<NodeId, PeerInfo>>,
    /// Lines that failed to frame as a known `GossipPayload` kind, dropped
    /// without delivery (spec §9: "unknown kinds are dropped with a
    /// counter" rather than the dynamic string-topic emitter it replaces).
    dropped_unknown: AtomicU64,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            peers: tokio::sync::RwLock::new(HashMap::new()),
            dropped_unknown: AtomicU64::new(0),
        }
    }

    pub fn record_dropped_unknown(&self) {
        self.dropped_unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_unknown_count(&self) -> u64 {
        self.dropped_unknown.load(Ordering::Relaxed)
    }

    pub async fn insert(&self, info: PeerInfo) {
        self.peers.write().await.insert(info.node_id.clone(), info);
    }

    /// Idempotent: removing an already-absent peer is a no-op.
    pub async fn remove(&self, node_id: &str) {
        self.peers.write().await.remove(node_id);
    }

    pub async fn contains(&self, node_id: &str) -> bool {
        self.peers.read().await.contains_key(node_id)
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn all_node_ids(&self) -> Vec<NodeId> {
        self.peers.read().await.keys().cloned().collect()
    }

    pub async fn update_rtt(&self, node_id: &str, rtt_ms: u64) {
        let mut guard = self.peers.write().await;
        if let Some(peer) = guard.get_mut(node_id) {
            peer.rtt_ms = Some(rtt_ms);
            peer.last_seen = Instant::now();
        }
    }

    pub async fn record_pending_ping(&self, node_id: &str, ping_id: String) {
        let mut guard = self.peers.write().await;
        if let Some(peer) = guard.get_mut(node_id) {
            peer.pending_pings.insert(ping_id, Instant::now());
        }
    }

    pub async fn resolve_pending_ping(&self, node_id: &str, ping_id: &str) -> Option<u64> {
        let mut guard = self.peers.write().await;
        let peer = guard.get_mut(node_id)?;
        let sent_at = peer.pending_pings.remove(ping_id)?;
        let rtt_ms = sent_at.elapsed().as_millis() as u64;
        peer.rtt_ms = Some(rtt_ms);
        peer.last_seen = Instant::now();
        Some(rtt_ms)
    }

    /// Discard pending pings older than `timeout_secs` without any RTT
    /// penalty (spec §4.3).
    pub async fn prune_stale_pings(&self, timeout_secs: u64) {
        let mut guard = self.peers.write().await;
        for peer in guard.values_mut() {
            peer.pending_pings
                .retain(|_, sent_at| sent_at.elapsed().as_secs() < timeout_secs);
        }
    }

    pub async fn sender_for(&self, node_id: &str) -> Option<PeerSender> {
        self.peers.read().await.get(node_id).map(|p| p.sender.clone())
    }

    /// Select up to `fanout` peers to relay to, excluding `exclude`:
    /// measured-RTT peers ascending first, then RTT-less peers in random
    /// order, truncated to `fanout` (spec §4.3).
    pub async fn select_relay_targets(&self, exclude: &str, fanout: usize) -> Vec<(NodeId, PeerSender)> {
        let guard = self.peers.read().await;
        let mut measured: Vec<(&NodeId, &PeerInfo)> = Vec::new();
        let mut unmeasured: Vec<(&NodeId, &PeerInfo)> = Vec::new();
        for (id, info) in guard.iter() {
            if id == exclude {
                continue;
            }
            if info.rtt_ms.is_some() {
                measured.push((id, info));
            } else {
                unmeasured.push((id, info));
            }
        }
        measured.sort_by_key(|(_, info)| info.rtt_ms.unwrap_or(u64::MAX));
        unmeasured.shuffle(&mut rand::thread_rng());

        measured
            .into_iter()
            .chain(unmeasured)
            .take(fanout)
            .map(|(id, info)| (id.clone(), info.sender.clone()))
            .collect()
    }
}
