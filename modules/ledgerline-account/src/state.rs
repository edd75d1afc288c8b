use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Open,
    Closed,
}

/// Account state as folded from its events and stored in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub account_id: String,
    pub holder_name: String,
    pub status: AccountStatus,
    pub currency: String,
    pub balance: i64,
}

impl AccountState {
    /// Placeholder state before `AccountCreated` has been folded in.
    pub fn initial() -> Self {
        Self::default()
    }
}
