use serde::{Deserialize, Serialize};

use crate::types::{AccountId, AssetId, Balance};

/// Capsule publication/availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapsuleStatus {
    Active,
    Withdrawn,
}

impl Default for CapsuleStatus {
    fn default() -> Self {
        CapsuleStatus::Active
    }
}

/// `attribution.creator` — who minted the capsule, for rating/royalty routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub creator: AccountId,
}

/// Price terms for a purchase: total `amount`, a `token` denomination
/// (currently always the single mesh token, kept as a string for forward
/// compatibility), and the creator's share of the proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: Balance,
    pub token: String,
    /// Fraction in `[0, 1]` of `amount` routed to the creator; the remainder
    /// goes to the platform account.
    pub creator_share: f64,
}

impl Price {
    /// `floor(amount * creator_share)`, the creator's cut of a purchase.
    pub fn creator_amount(&self) -> Balance {
        ((self.amount as f64) * self.creator_share).floor() as Balance
    }

    /// The remainder routed to the platform account.
    pub fn platform_amount(&self) -> Balance {
        self.amount - self.creator_amount()
    }
}

/// The public, peer-facing projection of a capsule. `content` is never
/// populated here — it travels only to the creator and to buyers whose
/// payment has confirmed, via the capsule store's local lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleRecord {
    pub asset_id: AssetId,
    #[serde(rename = "type")]
    pub capsule_type: String,
    pub confidence: f64,
    pub attribution: Attribution,
    pub tags: Vec<String>,
    pub price: Price,
    #[serde(default)]
    pub status: CapsuleStatus,
}

/// Filter parameters for `CapsuleStore::query`.
#[derive(Debug, Clone, Default)]
pub struct CapsuleFilter {
    pub capsule_type: Option<String>,
    pub creator: Option<AccountId>,
    pub status: Option<CapsuleStatus>,
    pub tags: Vec<String>,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
}
