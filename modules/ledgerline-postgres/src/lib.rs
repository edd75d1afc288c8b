//! Postgres backend for the ledgerline event-sourcing core.
//!
//! One table per entity log, one per snapshot set. Call `init_table(s)`
//! once at startup; it is safe to run repeatedly.

pub mod config;
mod error;
pub mod event_store;
pub mod hybrid_store;
mod queries;
pub mod schema;
pub mod snapshot_store;

pub use config::{PgStoreConfig, PoolConfig};
pub use event_store::PgEventStore;
pub use hybrid_store::PgHybridStore;
pub use snapshot_store::PgSnapshotStore;
