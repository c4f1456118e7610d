use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Balance, Nonce};

/// Projected per-account state: non-negative balance and monotone nonce.
/// Created implicitly the first time an account is credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub balance: Balance,
    /// Next-expected nonce is `nonce + 1`; zero means no transaction has
    /// been applied from this account yet.
    pub nonce: Nonce,
}

impl Account {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id, balance: 0, nonce: 0 }
    }

    pub fn next_expected_nonce(&self) -> Nonce {
        self.nonce + 1
    }
}
