//! Mapping from driver errors onto the store taxonomy.

use ledgerline_events::StoreError;

/// Wrap a driver error as an infrastructure fault, keeping it as the source.
pub(crate) fn wrap(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

/// True when the driver reports a unique violation on a primary key.
///
/// The event table's only unique constraint is `(entity_id, sequence)`, so
/// on an event insert this is the signature of a lost append race. A unique
/// violation that names no constraint, or another one, stays an
/// infrastructure error.
pub(crate) fn is_primary_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation()
                && db
                    .constraint()
                    .is_some_and(|constraint| constraint.ends_with("_pkey"))
        }
        _ => false,
    }
}
