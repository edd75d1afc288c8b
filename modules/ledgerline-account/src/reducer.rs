//! Account reducer wiring.
//!
//! `apply` is the exhaustive fold step; the registry maps each event name onto
//! it so the generic fold still rejects names nobody mounted.

use ledgerline_events::EntityReducer;

use crate::events::{AccountEvent, ACCOUNT_CREATED, ACCOUNT_CREDITED, ACCOUNT_DEBITED};
use crate::state::AccountState;

pub const ENTITY_NAME: &str = "Account";

pub fn apply(state: AccountState, event: &AccountEvent) -> AccountState {
    match event {
        AccountEvent::Created(e) => AccountState {
            account_id: e.account_id.clone(),
            holder_name: e.holder_name.clone(),
            status: e.status,
            currency: e.currency.clone(),
            balance: e.balance,
        },
        AccountEvent::Credited(e) => AccountState {
            balance: state.balance.saturating_add(e.amount),
            ..state
        },
        AccountEvent::Debited(e) => AccountState {
            balance: state.balance.saturating_sub(e.amount),
            ..state
        },
    }
}

pub fn account_reducer() -> EntityReducer<AccountState, AccountEvent> {
    EntityReducer::new(ENTITY_NAME)
        .with_event_reducer(ACCOUNT_CREATED, apply)
        .with_event_reducer(ACCOUNT_CREDITED, apply)
        .with_event_reducer(ACCOUNT_DEBITED, apply)
}
