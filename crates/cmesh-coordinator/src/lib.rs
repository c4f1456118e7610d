//! cmesh-coordinator
//!
//! Composition root: wires storage (ledger, capsules, ratings, bazaar) to
//! the gossip transport, dispatches inbound `GossipPayload` deliveries, and
//! drives the periodic bid/vote/settlement/sync scanners.

pub mod config;
pub mod engine;
pub mod events;

pub use config::MeshConfig;
pub use engine::Coordinator;
pub use events::GossipEvent;
