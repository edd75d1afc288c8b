//! The Account entity: business rules that turn commands into events.
//!
//! Every emitted event is folded into the local state right away, so a
//! command sequence on one instance sees its own effects. The caller is
//! responsible for appending the returned events.

use std::slice;

use ledgerline_events::EntityReducer;

use crate::error::AccountError;
use crate::events::{AccountCreated, AccountCredited, AccountDebited, AccountEvent};
use crate::reducer::account_reducer;
use crate::state::{AccountState, AccountStatus};

pub struct Account {
    state: AccountState,
    version: i64,
    reducer: EntityReducer<AccountState, AccountEvent>,
}

impl Account {
    pub fn new() -> Self {
        Self::from_state(AccountState::initial(), 0)
    }

    /// Rehydrate from a reconstructed state and the version it reflects.
    pub fn from_state(state: AccountState, version: i64) -> Self {
        Self {
            state,
            version,
            reducer: account_reducer(),
        }
    }

    fn update_state(&mut self, event: &AccountEvent) -> Result<(), AccountError> {
        let reduced =
            self.reducer
                .reduce_events(&self.state, slice::from_ref(event), self.version)?;
        self.state = reduced.state;
        self.version = reduced.version;
        Ok(())
    }

    pub fn create(
        &mut self,
        account_id: impl Into<String>,
        holder_name: impl Into<String>,
        currency: impl Into<String>,
    ) -> Result<AccountEvent, AccountError> {
        let event = AccountEvent::Created(AccountCreated {
            account_id: account_id.into(),
            holder_name: holder_name.into(),
            status: AccountStatus::Open,
            currency: currency.into(),
            balance: 0,
        });
        self.update_state(&event)?;
        Ok(event)
    }

    pub fn credit(&mut self, amount: i64, currency: &str) -> Result<AccountEvent, AccountError> {
        self.check_currency(currency)?;
        check_amount(amount)?;
        if self.state.balance.checked_add(amount).is_none() {
            return Err(AccountError::BalanceOverflow {
                balance: self.state.balance,
                amount,
            });
        }

        let event = AccountEvent::Credited(AccountCredited {
            amount,
            currency: currency.to_string(),
        });
        self.update_state(&event)?;
        Ok(event)
    }

    pub fn debit(&mut self, amount: i64, currency: &str) -> Result<AccountEvent, AccountError> {
        self.check_currency(currency)?;
        check_amount(amount)?;
        if self.state.balance - amount < 0 {
            return Err(AccountError::NotEnoughFunds {
                balance: self.state.balance,
                requested: amount,
            });
        }

        let event = AccountEvent::Debited(AccountDebited {
            amount,
            currency: currency.to_string(),
        });
        self.update_state(&event)?;
        Ok(event)
    }

    /// Current state. Fails at version 0: the placeholder state is never
    /// handed out as if it were a real account.
    pub fn state(&self) -> Result<&AccountState, AccountError> {
        if self.version == 0 {
            return Err(AccountError::NotInitialized);
        }
        Ok(&self.state)
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    fn check_currency(&self, currency: &str) -> Result<(), AccountError> {
        if self.state.currency != currency {
            return Err(AccountError::WrongCurrency {
                expected: self.state.currency.clone(),
                actual: currency.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

fn check_amount(amount: i64) -> Result<(), AccountError> {
    if amount <= 0 {
        return Err(AccountError::InvalidAmount(amount));
    }
    Ok(())
}
