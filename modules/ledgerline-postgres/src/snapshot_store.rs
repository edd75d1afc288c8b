//! PgSnapshotStore: snapshot rows in their own table.

use std::marker::PhantomData;

use async_trait::async_trait;
use ledgerline_events::{
    EntityState, SaveSnapshotOptions, Snapshot, SnapshotData, SnapshotStore, StoreResult,
    WriteMode,
};
use sqlx::PgPool;

use crate::config::PgStoreConfig;
use crate::error::wrap;
use crate::{queries, schema};

pub struct PgSnapshotStore<S> {
    table: String,
    write_mode: WriteMode,
    pool: PgPool,
    _state: PhantomData<fn() -> S>,
}

impl<S: EntityState> PgSnapshotStore<S> {
    pub fn new(pool: PgPool, config: &PgStoreConfig) -> Self {
        Self {
            table: config.snapshot_table_name(),
            write_mode: config.write_mode,
            pool,
            _state: PhantomData,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub async fn init_table(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        schema::create_snapshot_table(&mut conn, &self.table).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn resolve_mode(&self, options: SaveSnapshotOptions) -> WriteMode {
        options.write_mode.unwrap_or(self.write_mode)
    }

    /// Latest snapshot state for every entity, via the `is_latest` flag.
    pub async fn list_entities(&self) -> StoreResult<Vec<S>> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        queries::list_latest_states(&mut conn, &self.table).await
    }
}

#[async_trait]
impl<S: EntityState> SnapshotStore<S> for PgSnapshotStore<S> {
    async fn save_snapshot(
        &self,
        entity_id: &str,
        snapshot: SnapshotData<S>,
        options: SaveSnapshotOptions,
    ) -> StoreResult<()> {
        let mode = self.resolve_mode(options);
        let mut tx = self.pool.begin().await.map_err(wrap)?;
        queries::save_snapshot(&mut tx, &self.table, entity_id, &snapshot, mode).await?;
        tx.commit().await.map_err(wrap)?;
        Ok(())
    }

    async fn get_last_snapshot(&self, entity_id: &str) -> StoreResult<Option<Snapshot<S>>> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        queries::get_last_snapshot(&mut conn, &self.table, entity_id).await
    }

    async fn get_snapshot(
        &self,
        entity_id: &str,
        version: i64,
    ) -> StoreResult<Option<Snapshot<S>>> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        queries::get_snapshot(&mut conn, &self.table, entity_id, version).await
    }
}
