//! Error taxonomy for stores and reducers.

use thiserror::Error;

/// Errors surfaced by event and snapshot stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller's last-known sequence does not match the log.
    #[error(
        "wrong sequence for {entity_name} {entity_id}: events must be appended with a continuous sequence number, got {invalid_sequence}"
    )]
    WrongSequence {
        entity_name: String,
        entity_id: String,
        invalid_sequence: i64,
    },

    /// Another writer inserted the same sequence first.
    #[error(
        "concurrency conflict for {entity_name} {entity_id}: someone else appended events after sequence {sequence_in_conflict}"
    )]
    Concurrency {
        entity_name: String,
        entity_id: String,
        sequence_in_conflict: i64,
    },

    /// A stored record carries a name the event type cannot decode.
    #[error("{entity_name}: unknown event name in store: {event_name}")]
    UnknownEvent {
        entity_name: String,
        event_name: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other storage fault. The driver error is kept as the source.
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }

    /// True for the two optimistic-concurrency outcomes. Callers re-read and
    /// decide whether to retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::WrongSequence { .. } | StoreError::Concurrency { .. }
        )
    }
}

/// A folded event has no mounted reducer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity_name}: no reducer found for event: {event_name}")]
pub struct UnknownReducerError {
    pub entity_name: String,
    pub event_name: String,
}

/// Failure while rebuilding state from snapshot + delta.
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reduce(#[from] UnknownReducerError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn conflict_variants_are_grouped() {
        let wrong = StoreError::WrongSequence {
            entity_name: "Account".into(),
            entity_id: "123".into(),
            invalid_sequence: 1,
        };
        let race = StoreError::Concurrency {
            entity_name: "Account".into(),
            entity_id: "123".into(),
            sequence_in_conflict: 1,
        };
        assert!(wrong.is_conflict());
        assert!(race.is_conflict());
        assert!(!StoreError::backend("connection reset").is_conflict());
    }

    #[test]
    fn backend_error_preserves_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StoreError::backend(io);
        let source = err.source().expect("source kept");
        assert!(source.to_string().contains("refused"));
    }

    #[test]
    fn messages_name_the_offending_sequence() {
        let err = StoreError::WrongSequence {
            entity_name: "Account".into(),
            entity_id: "123".into(),
            invalid_sequence: 4,
        };
        assert!(err.to_string().contains("got 4"));

        let err = UnknownReducerError {
            entity_name: "Account".into(),
            event_name: "AccountFrozen".into(),
        };
        assert_eq!(
            err.to_string(),
            "Account: no reducer found for event: AccountFrozen"
        );
    }
}
