use cmesh_core::{GossipPayload, NodeId};

/// One inbound gossip delivery, paired with the peer it arrived from. The
/// `type` tag already selected a `GossipPayload` variant in `cmesh-p2p`;
/// this is the dispatch-table redesign from spec §9 — a `match` over a
/// closed enum rather than a string-keyed emitter.
#[derive(Debug, Clone)]
pub struct GossipEvent {
    pub from_peer: NodeId,
    pub payload: GossipPayload,
}

impl GossipEvent {
    pub fn new(from_peer: NodeId, payload: GossipPayload) -> Self {
        Self { from_peer, payload }
    }
}
