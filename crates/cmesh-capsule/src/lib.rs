//! cmesh-capsule
//!
//! Content-addressed storage for capsules: public metadata (`CapsuleRecord`)
//! replicated to every peer via gossip, and private content kept local to
//! the creator and confirmed buyers only.

pub mod store;

pub use store::CapsuleStore;
