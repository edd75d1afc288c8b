//! Backend selection: Postgres when `DATABASE_URL` is set, memory otherwise.

use std::sync::Arc;

use anyhow::{Context, Result};
use ledgerline_account::{AccountEvent, AccountState, ENTITY_NAME};
use ledgerline_events::{EventAppended, EventLike, EventStore, HybridStore, InMemoryHybridStore};
use ledgerline_postgres::{PgHybridStore, PgStoreConfig};
use tracing::info;

use crate::config::Config;

pub type AccountStore = dyn HybridStore<AccountEvent, AccountState>;

pub async fn connect(config: &Config) -> Result<Arc<AccountStore>> {
    let store: Arc<AccountStore> = match config.pool_config() {
        Some(pool_config) => {
            let pool = pool_config
                .connect()
                .await
                .context("Failed to connect to Postgres")?;
            let store = PgHybridStore::new(
                pool,
                &PgStoreConfig::new(ENTITY_NAME).with_write_mode(config.snapshot_write_mode),
            );
            store
                .init_tables()
                .await
                .context("Failed to create account tables")?;
            info!(
                events = store.event_table_name(),
                snapshots = store.snapshot_table_name(),
                "Postgres backend ready"
            );
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory backend");
            Arc::new(InMemoryHybridStore::with_write_mode(
                ENTITY_NAME,
                config.snapshot_write_mode,
            ))
        }
    };

    store.on_event_appended(Arc::new(log_appended));
    Ok(store)
}

fn log_appended(notification: &EventAppended<AccountEvent>) -> anyhow::Result<()> {
    let names: Vec<&str> = notification.events.iter().map(|e| e.name()).collect();
    info!(
        entity = %notification.entity_name,
        entity_id = %notification.entity_id,
        count = names.len(),
        events = ?names,
        "Events appended"
    );
    Ok(())
}
