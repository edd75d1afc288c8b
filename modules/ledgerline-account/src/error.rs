use ledgerline_events::{ReconstructError, StoreError, UnknownReducerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Wrong Currency: account holds {expected}, got {actual}")]
    WrongCurrency { expected: String, actual: String },

    #[error("Not Enough Funds: balance {balance}, requested {requested}")]
    NotEnoughFunds { balance: i64, requested: i64 },

    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    #[error("Balance overflow: balance {balance}, credit {amount}")]
    BalanceOverflow { balance: i64, amount: i64 },

    #[error("Entity not initialized, create the account before reading its state")]
    NotInitialized,

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Reduce(#[from] UnknownReducerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccountError {
    /// A business rule rejected the command. Nothing was written.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            AccountError::WrongCurrency { .. }
                | AccountError::NotEnoughFunds { .. }
                | AccountError::InvalidAmount(_)
                | AccountError::BalanceOverflow { .. }
        )
    }

    /// Another writer got there first; re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AccountError::Store(e) if e.is_conflict())
    }
}

impl From<ReconstructError> for AccountError {
    fn from(err: ReconstructError) -> Self {
        match err {
            ReconstructError::Store(e) => AccountError::Store(e),
            ReconstructError::Reduce(e) => AccountError::Reduce(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rule_violations_and_conflicts() {
        assert!(AccountError::InvalidAmount(-1).is_rule_violation());
        assert!(AccountError::BalanceOverflow {
            balance: i64::MAX,
            amount: 1
        }
        .is_rule_violation());
        assert!(!AccountError::NotInitialized.is_rule_violation());

        let conflict = AccountError::Store(StoreError::WrongSequence {
            entity_name: "Account".into(),
            entity_id: "123".into(),
            invalid_sequence: 1,
        });
        assert!(conflict.is_conflict());
        assert!(!conflict.is_rule_violation());
    }
}
