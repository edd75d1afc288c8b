//! PgHybridStore: event log and snapshots sharing one pool, with a single
//! transaction around append + snapshot.

use async_trait::async_trait;
use ledgerline_events::{
    AppendOptions, EntityState, EventAppendedListener, EventLike, EventStore, EventsPage,
    HybridStore, SaveSnapshotOptions, Snapshot, SnapshotData, SnapshotStore, StoreResult,
    StoredEvent,
};
use sqlx::PgPool;
use tracing::debug;

use crate::config::PgStoreConfig;
use crate::error::wrap;
use crate::event_store::PgEventStore;
use crate::queries;
use crate::snapshot_store::PgSnapshotStore;

pub struct PgHybridStore<E, S> {
    events: PgEventStore<E>,
    snapshots: PgSnapshotStore<S>,
    pool: PgPool,
}

impl<E: EventLike, S: EntityState> PgHybridStore<E, S> {
    pub fn new(pool: PgPool, config: &PgStoreConfig) -> Self {
        Self {
            events: PgEventStore::new(pool.clone(), config),
            snapshots: PgSnapshotStore::new(pool.clone(), config),
            pool,
        }
    }

    pub fn event_table_name(&self) -> &str {
        self.events.table_name()
    }

    pub fn snapshot_table_name(&self) -> &str {
        self.snapshots.table_name()
    }

    pub async fn init_tables(&self) -> StoreResult<()> {
        self.snapshots.init_table().await?;
        self.events.init_table().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl<E: EventLike, S: EntityState> EventStore<E> for PgHybridStore<E, S> {
    fn entity_name(&self) -> &str {
        self.events.entity_name()
    }

    async fn append(
        &self,
        entity_id: &str,
        events: &[E],
        options: AppendOptions,
    ) -> StoreResult<()> {
        self.events.append(entity_id, events, options).await
    }

    async fn get_events_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<EventsPage<E>> {
        self.events.get_events_from_sequence(entity_id, sequence).await
    }

    async fn get_records_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<Vec<StoredEvent<E>>> {
        self.events.get_records_from_sequence(entity_id, sequence).await
    }

    fn on_event_appended(&self, listener: EventAppendedListener<E>) {
        self.events.on_event_appended(listener);
    }
}

#[async_trait]
impl<E: EventLike, S: EntityState> SnapshotStore<S> for PgHybridStore<E, S> {
    async fn save_snapshot(
        &self,
        entity_id: &str,
        snapshot: SnapshotData<S>,
        options: SaveSnapshotOptions,
    ) -> StoreResult<()> {
        self.snapshots.save_snapshot(entity_id, snapshot, options).await
    }

    async fn get_last_snapshot(&self, entity_id: &str) -> StoreResult<Option<Snapshot<S>>> {
        self.snapshots.get_last_snapshot(entity_id).await
    }

    async fn get_snapshot(
        &self,
        entity_id: &str,
        version: i64,
    ) -> StoreResult<Option<Snapshot<S>>> {
        self.snapshots.get_snapshot(entity_id, version).await
    }
}

#[async_trait]
impl<E: EventLike, S: EntityState> HybridStore<E, S> for PgHybridStore<E, S> {
    async fn append_with_snapshot(
        &self,
        entity_id: &str,
        events: &[E],
        snapshot: SnapshotData<S>,
        options: AppendOptions,
    ) -> StoreResult<()> {
        let mode = self.snapshots.resolve_mode(SaveSnapshotOptions::default());

        // Dropping the transaction on an error path rolls it back and
        // returns the connection to the pool.
        let mut tx = self.pool.begin().await.map_err(wrap)?;

        queries::append_events(
            &mut tx,
            self.events.table_name(),
            self.events.entity_name(),
            entity_id,
            events,
            options,
        )
        .await?;

        queries::save_snapshot(
            &mut tx,
            self.snapshots.table_name(),
            entity_id,
            &snapshot,
            mode,
        )
        .await?;

        tx.commit().await.map_err(wrap)?;
        debug!(entity_id, version = snapshot.version, "Committed append with snapshot");

        if !events.is_empty() {
            self.events.notify(entity_id, events);
        }
        Ok(())
    }

    async fn list_entities(&self) -> StoreResult<Vec<S>> {
        self.snapshots.list_entities().await
    }
}
