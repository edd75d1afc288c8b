//! Connection and table configuration for the Postgres backend.

use std::time::Duration;

use ledgerline_events::{StoreError, WriteMode};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Pool settings. Acquisition timeouts surface as `StoreError::Backend`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
            .map_err(StoreError::backend)
    }
}

/// Which tables an entity lives in and how snapshots are written.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub entity_name: String,
    pub event_table: Option<String>,
    pub snapshot_table: Option<String>,
    pub write_mode: WriteMode,
}

impl PgStoreConfig {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            event_table: None,
            snapshot_table: None,
            write_mode: WriteMode::default(),
        }
    }

    pub fn with_event_table(mut self, table: impl Into<String>) -> Self {
        self.event_table = Some(table.into());
        self
    }

    pub fn with_snapshot_table(mut self, table: impl Into<String>) -> Self {
        self.snapshot_table = Some(table.into());
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Defaults to `<entity>_events`, lower-cased.
    pub fn event_table_name(&self) -> String {
        self.event_table
            .clone()
            .unwrap_or_else(|| format!("{}_events", self.entity_name.to_lowercase()))
    }

    /// Defaults to `<entity>_snapshots`, lower-cased.
    pub fn snapshot_table_name(&self) -> String {
        self.snapshot_table
            .clone()
            .unwrap_or_else(|| format!("{}_snapshots", self.entity_name.to_lowercase()))
    }
}
