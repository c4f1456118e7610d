//! cmesh-rating
//!
//! EWMA-smoothed node reputation: completion speed, failures, likes, and
//! the disqualification threshold that gates bazaar bidding eligibility.

pub mod engine;

pub use engine::{RatingConfig, RatingEngine};
