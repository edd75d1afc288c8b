//! AccountRepository: load/save accounts through any hybrid store.
//!
//! Loads are "last snapshot + delta + fold". Saves append the new events and
//! the resulting snapshot in one atomic write, guarded by the version the
//! account was loaded at.

use std::sync::Arc;

use ledgerline_events::{
    reconstruct, AppendOptions, EntityReducer, EventStore, HybridStore, SnapshotData,
    StoredEvent,
};
use tracing::debug;

use crate::account::Account;
use crate::error::AccountError;
use crate::events::AccountEvent;
use crate::reducer::account_reducer;
use crate::state::AccountState;

pub struct AccountRepository<H: ?Sized> {
    store: Arc<H>,
    reducer: EntityReducer<AccountState, AccountEvent>,
}

impl<H> AccountRepository<H>
where
    H: HybridStore<AccountEvent, AccountState> + ?Sized,
{
    pub fn new(store: Arc<H>) -> Self {
        Self {
            store,
            reducer: account_reducer(),
        }
    }

    pub fn store(&self) -> &Arc<H> {
        &self.store
    }

    /// `None` when the account has no history at all.
    pub async fn load(&self, account_id: &str) -> Result<Option<Account>, AccountError> {
        let reduced = reconstruct(
            self.store.as_ref(),
            &self.reducer,
            account_id,
            AccountState::initial(),
        )
        .await?;

        if reduced.version == 0 {
            return Ok(None);
        }
        Ok(Some(Account::from_state(reduced.state, reduced.version)))
    }

    /// Persist `events`, which must be the events `account` produced since it
    /// was loaded (or created), together with its current state as a snapshot.
    pub async fn save(
        &self,
        account_id: &str,
        account: &Account,
        events: &[AccountEvent],
    ) -> Result<(), AccountError> {
        let loaded_at = account.version() - events.len() as i64;
        let snapshot = SnapshotData {
            state: account.state()?.clone(),
            version: account.version(),
        };

        self.store
            .append_with_snapshot(account_id, events, snapshot, AppendOptions::after(loaded_at))
            .await?;

        debug!(
            account_id,
            from = loaded_at,
            to = account.version(),
            "Saved account"
        );
        Ok(())
    }

    pub async fn create(
        &self,
        account_id: &str,
        holder_name: &str,
        currency: &str,
    ) -> Result<AccountState, AccountError> {
        let mut account = Account::new();
        let event = account.create(account_id, holder_name, currency)?;
        self.save(account_id, &account, &[event]).await?;
        Ok(account.state()?.clone())
    }

    pub async fn credit(
        &self,
        account_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<AccountState, AccountError> {
        let mut account = self.get_account(account_id).await?;
        let event = account.credit(amount, currency)?;
        self.save(account_id, &account, &[event]).await?;
        Ok(account.state()?.clone())
    }

    pub async fn debit(
        &self,
        account_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<AccountState, AccountError> {
        let mut account = self.get_account(account_id).await?;
        let event = account.debit(amount, currency)?;
        self.save(account_id, &account, &[event]).await?;
        Ok(account.state()?.clone())
    }

    pub async fn get(&self, account_id: &str) -> Result<AccountState, AccountError> {
        let account = self.get_account(account_id).await?;
        Ok(account.state()?.clone())
    }

    /// Every stored event for the account, oldest first.
    pub async fn history(
        &self,
        account_id: &str,
    ) -> Result<Vec<StoredEvent<AccountEvent>>, AccountError> {
        let records = self.store.get_records_from_sequence(account_id, None).await?;
        if records.is_empty() {
            return Err(AccountError::NotFound(account_id.to_string()));
        }
        Ok(records)
    }

    /// Latest snapshot state of every account.
    pub async fn list(&self) -> Result<Vec<AccountState>, AccountError> {
        Ok(self.store.list_entities().await?)
    }

    async fn get_account(&self, account_id: &str) -> Result<Account, AccountError> {
        self.load(account_id)
            .await?
            .ok_or_else(|| AccountError::NotFound(account_id.to_string()))
    }
}
