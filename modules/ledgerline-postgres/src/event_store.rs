//! PgEventStore: per-entity append-only log backed by Postgres.
//!
//! Sequence assignment is serialized by the `(entity_id, sequence)` primary
//! key: two writers that read the same last sequence both try to insert the
//! same key and exactly one insert succeeds.

use async_trait::async_trait;
use ledgerline_events::{
    AppendOptions, EventAppended, EventAppendedListener, EventAppendedNotifier, EventLike,
    EventStore, EventsPage, StoreResult, StoredEvent,
};
use sqlx::PgPool;

use crate::config::PgStoreConfig;
use crate::error::wrap;
use crate::{queries, schema};

pub struct PgEventStore<E> {
    entity_name: String,
    table: String,
    pool: PgPool,
    notifier: EventAppendedNotifier<E>,
}

impl<E: EventLike> PgEventStore<E> {
    pub fn new(pool: PgPool, config: &PgStoreConfig) -> Self {
        Self {
            entity_name: config.entity_name.clone(),
            table: config.event_table_name(),
            pool,
            notifier: EventAppendedNotifier::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn init_table(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        schema::create_event_table(&mut conn, &self.table).await
    }

    /// Drain the pool. Later calls fail with a backend error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn notify(&self, entity_id: &str, events: &[E]) {
        if self.notifier.listener_count() == 0 {
            return;
        }
        self.notifier.notify(&EventAppended {
            entity_name: self.entity_name.clone(),
            entity_id: entity_id.to_string(),
            events: events.to_vec(),
        });
    }
}

#[async_trait]
impl<E: EventLike> EventStore<E> for PgEventStore<E> {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    async fn append(
        &self,
        entity_id: &str,
        events: &[E],
        options: AppendOptions,
    ) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        queries::append_events(
            &mut conn,
            &self.table,
            &self.entity_name,
            entity_id,
            events,
            options,
        )
        .await?;
        drop(conn);

        if !events.is_empty() {
            self.notify(entity_id, events);
        }
        Ok(())
    }

    async fn get_events_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<EventsPage<E>> {
        // Both reads see one snapshot of the log, so an empty page never
        // reports a last sequence newer than the events it left out.
        let mut tx = self.pool.begin().await.map_err(wrap)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(wrap)?;

        let records: Vec<StoredEvent<E>> =
            queries::read_records(&mut tx, &self.table, &self.entity_name, entity_id, sequence)
                .await?;

        let last_event_sequence = match records.last() {
            Some(record) => record.sequence,
            None => queries::last_sequence(&mut tx, &self.table, entity_id).await?,
        };
        tx.commit().await.map_err(wrap)?;

        Ok(EventsPage {
            events: records.into_iter().map(|r| r.event).collect(),
            last_event_sequence,
        })
    }

    async fn get_records_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<Vec<StoredEvent<E>>> {
        let mut conn = self.pool.acquire().await.map_err(wrap)?;
        queries::read_records(&mut conn, &self.table, &self.entity_name, entity_id, sequence).await
    }

    fn on_event_appended(&self, listener: EventAppendedListener<E>) {
        self.notifier.subscribe(listener);
    }
}
