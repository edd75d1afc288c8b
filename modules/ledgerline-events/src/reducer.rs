//! Event-name keyed reducer registry.
//!
//! Folding is pure: the caller's state is cloned before the first event is
//! applied, and an unknown event aborts the whole fold.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::UnknownReducerError;
use crate::types::{EventLike, Reduced};

/// A state transition for one event name.
pub type EventReducer<S, E> = Arc<dyn Fn(S, &E) -> S + Send + Sync>;

/// Reduces events for one entity type.
pub struct EntityReducer<S, E> {
    entity_name: String,
    reducers: HashMap<String, EventReducer<S, E>>,
}

impl<S, E> EntityReducer<S, E>
where
    S: Clone,
    E: EventLike,
{
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            reducers: HashMap::new(),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Mount a reducer for an event name. Mounting the same name twice
    /// replaces the earlier reducer.
    pub fn mount_event_reducer<F>(&mut self, event_name: impl Into<String>, reducer: F)
    where
        F: Fn(S, &E) -> S + Send + Sync + 'static,
    {
        self.reducers.insert(event_name.into(), Arc::new(reducer));
    }

    /// Builder form of [`mount_event_reducer`](Self::mount_event_reducer).
    pub fn with_event_reducer<F>(mut self, event_name: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(S, &E) -> S + Send + Sync + 'static,
    {
        self.mount_event_reducer(event_name, reducer);
        self
    }

    pub fn handles(&self, event_name: &str) -> bool {
        self.reducers.contains_key(event_name)
    }

    /// Fold `events` in order onto a copy of `state`.
    ///
    /// Returns `state_version + events.len()` as the new version. Nothing is
    /// returned if any event lacks a reducer.
    pub fn reduce_events(
        &self,
        state: &S,
        events: &[E],
        state_version: i64,
    ) -> Result<Reduced<S>, UnknownReducerError> {
        let mut new_state = state.clone();
        let mut new_version = state_version;

        for event in events {
            let reducer =
                self.reducers
                    .get(event.name())
                    .ok_or_else(|| UnknownReducerError {
                        entity_name: self.entity_name.clone(),
                        event_name: event.name().to_string(),
                    })?;

            new_state = reducer(new_state, event);
            new_version += 1;
        }

        Ok(Reduced {
            state: new_state,
            version: new_version,
        })
    }
}

impl<S, E> Clone for EntityReducer<S, E> {
    fn clone(&self) -> Self {
        Self {
            entity_name: self.entity_name.clone(),
            reducers: self.reducers.clone(),
        }
    }
}

impl<S, E> fmt::Debug for EntityReducer<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.reducers.keys().collect();
        names.sort();
        f.debug_struct("EntityReducer")
            .field("entity_name", &self.entity_name)
            .field("event_names", &names)
            .finish()
    }
}
