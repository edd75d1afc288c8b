//! The Account entity: a small bank account with credit/debit rules, built
//! on the ledgerline event log.

pub mod account;
pub mod error;
pub mod events;
pub mod reducer;
pub mod repository;
pub mod state;

pub use account::Account;
pub use error::AccountError;
pub use events::{AccountCreated, AccountCredited, AccountDebited, AccountEvent};
pub use reducer::{account_reducer, ENTITY_NAME};
pub use repository::AccountRepository;
pub use state::{AccountState, AccountStatus};
