//! cmesh-p2p
//!
//! Hand-rolled gossip transport: line-delimited JSON over tokio TCP, with
//! handshake, seen-set deduplication, bounded-fanout relay, RTT-ranked peer
//! selection, and periodic heartbeats.

pub mod config;
pub mod envelope;
pub mod network;
pub mod peer;
pub mod seen;

pub use config::P2pConfig;
pub use envelope::Envelope;
pub use network::{Delivery, GossipHandle, GossipTransport};
pub use peer::{PeerInfo, PeerTable};
pub use seen::SeenSet;
