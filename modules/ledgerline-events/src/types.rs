//! Core types shared by every backend. Domain-agnostic.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// The raw record shape: an event name and its JSON payload.
///
/// The ordering key is never part of the event. Stores assign it on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Anything that can travel through an event store.
///
/// Domain event sets are usually a sum type with one variant per event name;
/// `from_parts` is where a name the sum type does not know is rejected.
pub trait EventLike: Clone + Send + Sync + 'static {
    /// The event name stored in the `name` column.
    fn name(&self) -> &str;

    /// Serialize the event body to the JSON stored in the `payload` column.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Rebuild the event from a stored name and payload.
    fn from_parts(
        entity_name: &str,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<Self, StoreError>;
}

impl EventLike for Event {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(self.payload.clone())
    }

    fn from_parts(
        _entity_name: &str,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<Self, StoreError> {
        Ok(Event::new(name, payload))
    }
}

/// An event as stored in an entity log. Returned by record reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    pub entity_id: String,
    /// 1-based, gapless within one entity.
    pub sequence: i64,
    pub event: E,
    pub appended_at: DateTime<Utc>,
}

/// Result of a range read.
///
/// `last_event_sequence` is the entity's true last sequence, even when
/// `events` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsPage<E> {
    pub events: Vec<E>,
    pub last_event_sequence: i64,
}

impl<E> EventsPage<E> {
    pub fn empty(last_event_sequence: i64) -> Self {
        Self {
            events: Vec::new(),
            last_event_sequence,
        }
    }
}

/// A persisted point-in-time state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    pub entity_id: String,
    /// Sequence of the last event `state` reflects.
    pub version: i64,
    pub state: S,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The `(state, version)` pair handed to a snapshot write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData<S> {
    pub state: S,
    pub version: i64,
}

impl<S> From<Snapshot<S>> for SnapshotData<S> {
    fn from(snapshot: Snapshot<S>) -> Self {
        Self {
            state: snapshot.state,
            version: snapshot.version,
        }
    }
}

/// Output of a fold: the new state and the version it reflects.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced<S> {
    pub state: S,
    pub version: i64,
}

/// Options for `EventStore::append`.
///
/// `None` skips the optimistic concurrency check. `Some(0)` asserts the log
/// is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOptions {
    pub append_after_sequence: Option<i64>,
}

impl AppendOptions {
    pub fn after(sequence: i64) -> Self {
        Self {
            append_after_sequence: Some(sequence),
        }
    }

    pub fn unchecked() -> Self {
        Self::default()
    }
}

/// How a snapshot write treats the entity's existing snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteMode {
    /// Insert a new row; keep every historical snapshot.
    #[default]
    Append,
    /// Keep exactly one row per entity, updated in place.
    Replace,
    /// Drop every prior snapshot, then insert the new one.
    Compact,
    /// Overwrite the highest-version row, keeping older history.
    OverwriteLast,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "APPEND",
            WriteMode::Replace => "REPLACE",
            WriteMode::Compact => "COMPACT",
            WriteMode::OverwriteLast => "OVERWRITE_LAST",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPEND" => Ok(WriteMode::Append),
            "REPLACE" => Ok(WriteMode::Replace),
            "COMPACT" => Ok(WriteMode::Compact),
            "OVERWRITE_LAST" => Ok(WriteMode::OverwriteLast),
            other => Err(format!("unknown snapshot write mode: {other}")),
        }
    }
}

/// Options for `SnapshotStore::save_snapshot`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSnapshotOptions {
    /// Falls back to the store's configured default when `None`.
    pub write_mode: Option<WriteMode>,
}

impl SaveSnapshotOptions {
    pub fn with_mode(write_mode: WriteMode) -> Self {
        Self {
            write_mode: Some(write_mode),
        }
    }
}

/// Notification fired once per successful append.
#[derive(Debug, Clone)]
pub struct EventAppended<E> {
    pub entity_name: String,
    pub entity_id: String,
    pub events: Vec<E>,
}

/// Clamp a caller-supplied read position. Negative positions read from the start.
pub fn clamp_sequence(sequence: Option<i64>) -> i64 {
    sequence.unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_mode_parses_case_insensitively() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!(
            "Overwrite_Last".parse::<WriteMode>().unwrap(),
            WriteMode::OverwriteLast
        );
        assert!("truncate".parse::<WriteMode>().is_err());
    }

    #[test]
    fn write_mode_defaults_to_append() {
        assert_eq!(WriteMode::default(), WriteMode::Append);
        assert_eq!(SaveSnapshotOptions::default().write_mode, None);
    }

    #[test]
    fn zero_and_absent_append_guards_are_distinct() {
        assert_ne!(AppendOptions::after(0), AppendOptions::unchecked());
    }

    #[test]
    fn clamp_sequence_treats_negative_as_start() {
        assert_eq!(clamp_sequence(None), 0);
        assert_eq!(clamp_sequence(Some(-4)), 0);
        assert_eq!(clamp_sequence(Some(7)), 7);
    }

    #[test]
    fn raw_event_round_trips_through_parts() {
        let event = Event::new("Pinged", json!({"n": 1}));
        let payload = event.to_payload().unwrap();
        let rebuilt = Event::from_parts("Probe", event.name(), payload).unwrap();
        assert_eq!(rebuilt, event);
    }
}
