//! In-memory backends. No database required.
//!
//! Every store instance owns its own maps, so two instances are two
//! independent logs. A single mutex guards each map; the check-then-write of
//! an append happens under one lock, which is what serializes sequence
//! assignment per process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::notify::{EventAppendedListener, EventAppendedNotifier};
use crate::store::{EntityState, EventStore, HybridStore, SnapshotStore};
use crate::types::{
    clamp_sequence, AppendOptions, EventAppended, EventLike, EventsPage, SaveSnapshotOptions,
    Snapshot, SnapshotData, StoredEvent, WriteMode,
};

/// Storage-level faults raised by the in-memory backend.
#[derive(Debug, Error)]
pub enum MemoryBackendError {
    #[error("duplicate snapshot for entity {entity_id} at version {version}")]
    DuplicateSnapshot { entity_id: String, version: i64 },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// InMemoryEventStore
// ---------------------------------------------------------------------------

pub struct InMemoryEventStore<E> {
    entity_name: String,
    logs: Mutex<HashMap<String, Vec<StoredEvent<E>>>>,
    notifier: EventAppendedNotifier<E>,
}

impl<E: EventLike> InMemoryEventStore<E> {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            logs: Mutex::new(HashMap::new()),
            notifier: EventAppendedNotifier::new(),
        }
    }

    /// Run the sequence check and build the records for a batch. Writes nothing.
    fn prepare_append(
        &self,
        log: &[StoredEvent<E>],
        entity_id: &str,
        events: &[E],
        options: AppendOptions,
    ) -> StoreResult<Vec<StoredEvent<E>>> {
        let last_sequence = log.len() as i64;

        if let Some(expected) = options.append_after_sequence {
            if expected != last_sequence {
                warn!(
                    entity_id,
                    expected,
                    actual = last_sequence,
                    "Rejected append: stale sequence"
                );
                return Err(StoreError::WrongSequence {
                    entity_name: self.entity_name.clone(),
                    entity_id: entity_id.to_string(),
                    invalid_sequence: expected,
                });
            }
        }

        let appended_at = Utc::now();
        Ok(events
            .iter()
            .zip(last_sequence + 1..)
            .map(|(event, sequence)| StoredEvent {
                entity_id: entity_id.to_string(),
                sequence,
                event: event.clone(),
                appended_at,
            })
            .collect())
    }

    fn notify(&self, entity_id: &str, events: &[E]) {
        self.notifier.notify(&EventAppended {
            entity_name: self.entity_name.clone(),
            entity_id: entity_id.to_string(),
            events: events.to_vec(),
        });
    }

    fn read_records(&self, entity_id: &str, sequence: Option<i64>) -> (Vec<StoredEvent<E>>, i64) {
        let from = clamp_sequence(sequence);
        let logs = lock(&self.logs);
        let log = logs.get(entity_id).map(Vec::as_slice).unwrap_or_default();
        let last_sequence = log.len() as i64;
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(log.len());
        (log[start..].to_vec(), last_sequence)
    }
}

#[async_trait]
impl<E: EventLike> EventStore<E> for InMemoryEventStore<E> {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    async fn append(
        &self,
        entity_id: &str,
        events: &[E],
        options: AppendOptions,
    ) -> StoreResult<()> {
        {
            let mut logs = lock(&self.logs);
            let log = logs.entry(entity_id.to_string()).or_default();
            let records = self.prepare_append(log, entity_id, events, options)?;
            if records.is_empty() {
                return Ok(());
            }
            log.extend(records);
            debug!(
                entity_id,
                count = events.len(),
                last_sequence = log.len(),
                "Appended events"
            );
        }

        self.notify(entity_id, events);
        Ok(())
    }

    async fn get_events_from_sequence(
        &self,
        entity_id: &str,
        sequence: Option<i64>,
    ) -> StoreResult<EventsPage<E>> {
        let (records, last_event_sequence) = self.read_records(entity_id, sequence);
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
        Ok(self.read_records(entity_id, sequence).0)
    }

    fn on_event_appended(&self, listener: EventAppendedListener<E>) {
        self.notifier.subscribe(listener);
    }
}

// ---------------------------------------------------------------------------
// InMemorySnapshotStore
// ---------------------------------------------------------------------------

pub struct InMemorySnapshotStore<S> {
    snapshots: Mutex<HashMap<String, Vec<Snapshot<S>>>>,
    write_mode: WriteMode,
}

impl<S: EntityState> InMemorySnapshotStore<S> {
    pub fn new() -> Self {
        Self::with_write_mode(WriteMode::default())
    }

    /// Default mode used when a save passes no explicit mode.
    pub fn with_write_mode(write_mode: WriteMode) -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            write_mode,
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    fn latest_index(snapshots: &[Snapshot<S>]) -> Option<usize> {
        snapshots
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| s.version)
            .map(|(i, _)| i)
    }

    /// Apply one snapshot write to an entity's rows. Checks run before any
    /// mutation, so an error leaves `rows` untouched.
    fn apply(
        rows: &mut Vec<Snapshot<S>>,
        entity_id: &str,
        data: SnapshotData<S>,
        mode: WriteMode,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let version = data.version;
        let fresh = |data: SnapshotData<S>| Snapshot {
            entity_id: entity_id.to_string(),
            version: data.version,
            state: data.state,
            created_at: now,
            updated_at: now,
        };
        let duplicate = || {
            StoreError::backend(MemoryBackendError::DuplicateSnapshot {
                entity_id: entity_id.to_string(),
                version,
            })
        };

        match mode {
            WriteMode::Append => {
                if rows.iter().any(|s| s.version == version) {
                    return Err(duplicate());
                }
                rows.push(fresh(data));
            }
            WriteMode::Replace => match Self::latest_index(rows) {
                Some(idx) => {
                    let mut kept = rows.swap_remove(idx);
                    kept.version = data.version;
                    kept.state = data.state;
                    kept.updated_at = now;
                    rows.clear();
                    rows.push(kept);
                }
                None => rows.push(fresh(data)),
            },
            WriteMode::Compact => {
                rows.clear();
                rows.push(fresh(data));
            }
            WriteMode::OverwriteLast => match Self::latest_index(rows) {
                Some(idx) => {
                    let clash = rows
                        .iter()
                        .enumerate()
                        .any(|(i, s)| i != idx && s.version == version);
                    if clash {
                        return Err(duplicate());
                    }
                    let last = &mut rows[idx];
                    last.version = data.version;
                    last.state = data.state;
                    last.updated_at = now;
                }
                None => rows.push(fresh(data)),
            },
        }

        Ok(())
    }

    fn save_locked(
        &self,
        all: &mut HashMap<String, Vec<Snapshot<S>>>,
        entity_id: &str,
        data: SnapshotData<S>,
        options: SaveSnapshotOptions,
    ) -> StoreResult<()> {
        let mode = options.write_mode.unwrap_or(self.write_mode);
        let version = data.version;
        let rows = all.entry(entity_id.to_string()).or_default();
        Self::apply(rows, entity_id, data, mode)?;
        debug!(entity_id, version, mode = %mode, "Saved snapshot");
        Ok(())
    }

    fn latest_states(&self) -> Vec<S> {
        let all = lock(&self.snapshots);
        let mut entity_ids: Vec<&String> = all.keys().collect();
        entity_ids.sort();
        entity_ids
            .into_iter()
            .filter_map(|id| {
                let rows = &all[id];
                Self::latest_index(rows).map(|idx| rows[idx].state.clone())
            })
            .collect()
    }
}

impl<S: EntityState> Default for InMemorySnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: EntityState> SnapshotStore<S> for InMemorySnapshotStore<S> {
    async fn save_snapshot(
        &self,
        entity_id: &str,
        snapshot: SnapshotData<S>,
        options: SaveSnapshotOptions,
    ) -> StoreResult<()> {
        let mut all = lock(&self.snapshots);
        self.save_locked(&mut all, entity_id, snapshot, options)
    }

    async fn get_last_snapshot(&self, entity_id: &str) -> StoreResult<Option<Snapshot<S>>> {
        let all = lock(&self.snapshots);
        Ok(all.get(entity_id).and_then(|rows| {
            Self::latest_index(rows).map(|idx| rows[idx].clone())
        }))
    }

    async fn get_snapshot(
        &self,
        entity_id: &str,
        version: i64,
    ) -> StoreResult<Option<Snapshot<S>>> {
        let all = lock(&self.snapshots);
        Ok(all
            .get(entity_id)
            .and_then(|rows| rows.iter().find(|s| s.version == version).cloned()))
    }
}

// ---------------------------------------------------------------------------
// InMemoryHybridStore
// ---------------------------------------------------------------------------

pub struct InMemoryHybridStore<E, S> {
    events: InMemoryEventStore<E>,
    snapshots: InMemorySnapshotStore<S>,
}

impl<E: EventLike, S: EntityState> InMemoryHybridStore<E, S> {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self::with_write_mode(entity_name, WriteMode::default())
    }

    pub fn with_write_mode(entity_name: impl Into<String>, write_mode: WriteMode) -> Self {
        Self {
            events: InMemoryEventStore::new(entity_name),
            snapshots: InMemorySnapshotStore::with_write_mode(write_mode),
        }
    }
}

#[async_trait]
impl<E: EventLike, S: EntityState> EventStore<E> for InMemoryHybridStore<E, S> {
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
impl<E: EventLike, S: EntityState> SnapshotStore<S> for InMemoryHybridStore<E, S> {
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
impl<E: EventLike, S: EntityState> HybridStore<E, S> for InMemoryHybridStore<E, S> {
    async fn append_with_snapshot(
        &self,
        entity_id: &str,
        events: &[E],
        snapshot: SnapshotData<S>,
        options: AppendOptions,
    ) -> StoreResult<()> {
        {
            // Lock order: events, then snapshots.
            let mut logs = lock(&self.events.logs);
            let mut all_snapshots = lock(&self.snapshots.snapshots);

            let log = logs.entry(entity_id.to_string()).or_default();
            let records = self
                .events
                .prepare_append(log, entity_id, events, options)?;
            self.snapshots.save_locked(
                &mut all_snapshots,
                entity_id,
                snapshot,
                SaveSnapshotOptions::default(),
            )?;
            log.extend(records);
            debug!(
                entity_id,
                count = events.len(),
                last_sequence = log.len(),
                "Appended events with snapshot"
            );
        }

        if !events.is_empty() {
            self.events.notify(entity_id, events);
        }
        Ok(())
    }

    async fn list_entities(&self) -> StoreResult<Vec<S>> {
        Ok(self.snapshots.latest_states())
    }
}
