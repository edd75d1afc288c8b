//! Store traits and the read-side composition.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{ReconstructError, StoreResult};
use crate::notify::EventAppendedListener;
use crate::reducer::EntityReducer;
use crate::types::{
    AppendOptions, EventLike, EventsPage, Reduced, SaveSnapshotOptions, Snapshot, SnapshotData,
    StoredEvent,
};

/// Anything that can be snapshotted. Blanket-implemented.
pub trait EntityState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> EntityState for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Per-entity append-only log with optimistic concurrency.
#[async_trait]
pub trait EventStore<E: EventLike>: Send + Sync {
    /// Logical entity name used in errors and notifications.
    fn entity_name(&self) -> &str;

    /// Append a batch atomically. Sequences continue from the entity's last
    /// sequence, in batch order.
    ///
    /// With `append_after_sequence` set, the batch is rejected with
    /// `WrongSequence` when the log has moved, or `Concurrency` when another
    /// writer claims the same sequence first. An empty batch is a no-op.
    async fn append(
        &self,
        entity_id: &str,
        events: &[E],
        options: AppendOptions,
    ) -> StoreResult<()>;

    /// Events with a sequence strictly greater than `sequence`, ascending.
    async fn get_events_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<EventsPage<E>>;

    /// Same filter as `get_events_from_sequence`, with sequence and timestamp.
    async fn get_records_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<Vec<StoredEvent<E>>>;

    /// Register a listener for every successful append on this store.
    fn on_event_appended(&self, listener: EventAppendedListener<E>);
}

/// Point-in-time `(state, version)` persistence.
#[async_trait]
pub trait SnapshotStore<S: EntityState>: Send + Sync {
    async fn save_snapshot(
        &self,
        entity_id: &str,
        snapshot: SnapshotData<S>,
        options: SaveSnapshotOptions,
    ) -> StoreResult<()>;

    /// The snapshot with the highest version, if any.
    async fn get_last_snapshot(&self, entity_id: &str) -> StoreResult<Option<Snapshot<S>>>;

    async fn get_snapshot(&self, entity_id: &str, version: i64)
        -> StoreResult<Option<Snapshot<S>>>;
}

/// Event log and snapshots behind one atomic write path.
#[async_trait]
pub trait HybridStore<E: EventLike, S: EntityState>: EventStore<E> + SnapshotStore<S> {
    /// Append and snapshot as one unit. A rejected append writes no snapshot.
    async fn append_with_snapshot(
        &self,
        entity_id: &str,
        events: &[E],
        snapshot: SnapshotData<S>,
        options: AppendOptions,
    ) -> StoreResult<()>;

    /// Latest snapshot state of every entity that has one.
    async fn list_entities(&self) -> StoreResult<Vec<S>>;
}

/// Rebuild current state: last snapshot (or `initial_state` at version 0)
/// plus every event after it.
///
/// A result at version 0 means the entity has no history.
pub async fn reconstruct<E, S, T>(
    store: &T,
    reducer: &EntityReducer<S, E>,
    entity_id: &str,
    initial_state: S,
) -> Result<Reduced<S>, ReconstructError>
where
    E: EventLike,
    S: EntityState,
    T: EventStore<E> + SnapshotStore<S> + ?Sized,
{
    let baseline = match store.get_last_snapshot(entity_id).await? {
        Some(snapshot) => SnapshotData::from(snapshot),
        None => SnapshotData {
            state: initial_state,
            version: 0,
        },
    };

    let page = store
        .get_events_from_sequence(entity_id, Some(baseline.version))
        .await?;

    debug!(
        entity_id,
        snapshot_version = baseline.version,
        delta = page.events.len(),
        "Reconstructing entity state"
    );

    let reduced = reducer.reduce_events(&baseline.state, &page.events, baseline.version)?;
    Ok(reduced)
}
