//! Event-sourcing persistence core.
//!
//! An append-only event log per entity, point-in-time snapshots, and a
//! deterministic event-to-state reducer. Backends implement the traits in
//! [`store`]; the in-memory backend lives in [`memory`].
//!
//! Reading current state is always "last snapshot + events after it + fold",
//! see [`reconstruct`].

pub mod error;
pub mod memory;
pub mod notify;
pub mod reducer;
pub mod store;
pub mod types;

pub use error::{ReconstructError, StoreError, StoreResult, UnknownReducerError};
pub use memory::{InMemoryEventStore, InMemoryHybridStore, InMemorySnapshotStore};
pub use notify::{EventAppendedListener, EventAppendedNotifier};
pub use reducer::{EntityReducer, EventReducer};
pub use store::{reconstruct, EntityState, EventStore, HybridStore, SnapshotStore};
pub use types::{
    clamp_sequence, AppendOptions, Event, EventAppended, EventLike, EventsPage, Reduced,
    SaveSnapshotOptions, Snapshot, SnapshotData, StoredEvent, WriteMode,
};
