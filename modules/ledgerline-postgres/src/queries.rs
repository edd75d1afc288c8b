//! SQL for the event and snapshot tables.
//!
//! Every helper takes a `&mut PgConnection` so it runs the same way on a
//! pooled connection or inside a transaction.

use chrono::{DateTime, Utc};
use ledgerline_events::{
    clamp_sequence, AppendOptions, EntityState, EventLike, Snapshot, SnapshotData, StoreError,
    StoreResult, StoredEvent, WriteMode,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use tracing::{debug, warn};

use crate::error::{is_primary_key_violation, wrap};
use crate::schema::quote_ident;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

struct EventRow {
    entity_id: String,
    sequence: i64,
    name: String,
    payload: serde_json::Value,
    appended_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            entity_id: row.try_get("entity_id")?,
            sequence: row.try_get("sequence")?,
            name: row.try_get("name")?,
            payload: row.try_get("payload")?,
            appended_at: row.try_get("appended_at")?,
        })
    }
}

impl EventRow {
    fn decode<E: EventLike>(self, entity_name: &str) -> StoreResult<StoredEvent<E>> {
        Ok(StoredEvent {
            event: E::from_parts(entity_name, &self.name, self.payload)?,
            entity_id: self.entity_id,
            sequence: self.sequence,
            appended_at: self.appended_at,
        })
    }
}

/// The entity's last sequence, or 0 when it has no events.
pub(crate) async fn last_sequence(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
) -> StoreResult<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX(sequence), 0) FROM {} WHERE entity_id = $1",
        quote_ident(table)
    );

    let row = sqlx::query_as::<_, (i64,)>(&sql)
        .bind(entity_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(wrap)?;

    Ok(row.0)
}

/// Check the caller's sequence, then insert the batch as one statement.
pub(crate) async fn append_events<E: EventLike>(
    conn: &mut PgConnection,
    table: &str,
    entity_name: &str,
    entity_id: &str,
    events: &[E],
    options: AppendOptions,
) -> StoreResult<()> {
    let last = last_sequence(conn, table, entity_id).await?;

    if let Some(expected) = options.append_after_sequence {
        if expected != last {
            warn!(
                entity_id,
                expected,
                actual = last,
                "Rejected append: stale sequence"
            );
            return Err(StoreError::WrongSequence {
                entity_name: entity_name.to_string(),
                entity_id: entity_id.to_string(),
                invalid_sequence: expected,
            });
        }
    }

    if events.is_empty() {
        return Ok(());
    }

    let mut rows = Vec::with_capacity(events.len());
    for (event, sequence) in events.iter().zip(last + 1..) {
        rows.push((sequence, event.name().to_string(), event.to_payload()?));
    }

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} (entity_id, sequence, name, payload) ",
        quote_ident(table)
    ));
    qb.push_values(rows, |mut b, (sequence, name, payload)| {
        b.push_bind(entity_id.to_string())
            .push_bind(sequence)
            .push_bind(name)
            .push_bind(payload);
    });

    match qb.build().execute(&mut *conn).await {
        Ok(_) => {
            debug!(
                entity_id,
                count = events.len(),
                last_sequence = last + events.len() as i64,
                "Appended events"
            );
            Ok(())
        }
        Err(e) if is_primary_key_violation(&e) => {
            warn!(entity_id, sequence = last, "Lost append race");
            Err(StoreError::Concurrency {
                entity_name: entity_name.to_string(),
                entity_id: entity_id.to_string(),
                sequence_in_conflict: options.append_after_sequence.unwrap_or(last),
            })
        }
        Err(e) => Err(wrap(e)),
    }
}

/// Records with a sequence strictly greater than `sequence`, ascending.
pub(crate) async fn read_records<E: EventLike>(
    conn: &mut PgConnection,
    table: &str,
    entity_name: &str,
    entity_id: &str,
    sequence: Option<i64>,
) -> StoreResult<Vec<StoredEvent<E>>> {
    let sql = format!(
        r#"
        SELECT entity_id, sequence, name, payload, appended_at
        FROM {}
        WHERE entity_id = $1 AND sequence > $2
        ORDER BY sequence ASC
        "#,
        quote_ident(table)
    );

    let rows = sqlx::query_as::<_, EventRow>(&sql)
        .bind(entity_id)
        .bind(clamp_sequence(sequence))
        .fetch_all(&mut *conn)
        .await
        .map_err(wrap)?;

    rows.into_iter().map(|row| row.decode(entity_name)).collect()
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

struct SnapshotRow {
    entity_id: String,
    version: i64,
    state: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SnapshotRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SnapshotRow {
            entity_id: row.try_get("entity_id")?,
            version: row.try_get("version")?,
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl SnapshotRow {
    fn decode<S: EntityState>(self) -> StoreResult<Snapshot<S>> {
        Ok(Snapshot {
            entity_id: self.entity_id,
            version: self.version,
            state: serde_json::from_value(self.state)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SNAPSHOT_COLUMNS: &str = "entity_id, version, state, created_at, updated_at";

async fn insert_snapshot(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
    version: i64,
    state: &serde_json::Value,
) -> StoreResult<()> {
    let sql = format!(
        "INSERT INTO {} (entity_id, version, state) VALUES ($1, $2, $3)",
        quote_ident(table)
    );
    sqlx::query(&sql)
        .bind(entity_id)
        .bind(version)
        .bind(state)
        .execute(&mut *conn)
        .await
        .map_err(wrap)?;
    Ok(())
}

/// Update the entity's highest-version row in place. Returns false when the
/// entity has no snapshot yet.
async fn update_last_snapshot(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
    version: i64,
    state: &serde_json::Value,
) -> StoreResult<bool> {
    let sql = format!(
        r#"
        UPDATE {table}
        SET version = $2, state = $3, updated_at = now()
        WHERE entity_id = $1
          AND version = (SELECT MAX(version) FROM {table} WHERE entity_id = $1)
        "#,
        table = quote_ident(table)
    );
    let result = sqlx::query(&sql)
        .bind(entity_id)
        .bind(version)
        .bind(state)
        .execute(&mut *conn)
        .await
        .map_err(wrap)?;
    Ok(result.rows_affected() > 0)
}

/// Move the `is_latest` flag onto the highest-version row.
async fn lock_entity(conn: &mut PgConnection, table: &str, entity_id: &str) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
        .bind(table)
        .bind(entity_id)
        .execute(&mut *conn)
        .await
        .map_err(wrap)?;
    Ok(())
}

async fn refresh_latest_flag(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
) -> StoreResult<()> {
    let table = quote_ident(table);

    let clear = format!("UPDATE {table} SET is_latest = FALSE WHERE entity_id = $1 AND is_latest");
    sqlx::query(&clear)
        .bind(entity_id)
        .execute(&mut *conn)
        .await
        .map_err(wrap)?;

    let set = format!(
        r#"
        UPDATE {table} SET is_latest = TRUE
        WHERE entity_id = $1
          AND version = (SELECT MAX(version) FROM {table} WHERE entity_id = $1)
        "#
    );
    sqlx::query(&set)
        .bind(entity_id)
        .execute(&mut *conn)
        .await
        .map_err(wrap)?;

    Ok(())
}

/// Write one snapshot according to `mode`. Run inside a transaction: the
/// mode's statements and the latest-flag refresh must land together.
pub(crate) async fn save_snapshot<S: EntityState>(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
    snapshot: &SnapshotData<S>,
    mode: WriteMode,
) -> StoreResult<()> {
    let state = serde_json::to_value(&snapshot.state)?;
    let version = snapshot.version;
    let quoted = quote_ident(table);

    // Snapshot writes for one entity are serialized until commit, so the
    // latest-flag refresh never races another writer's.
    lock_entity(conn, table, entity_id).await?;

    match mode {
        WriteMode::Append => {
            insert_snapshot(conn, table, entity_id, version, &state).await?;
        }
        WriteMode::Replace => {
            let prune = format!(
                r#"
                DELETE FROM {quoted}
                WHERE entity_id = $1
                  AND version <> (SELECT MAX(version) FROM {quoted} WHERE entity_id = $1)
                "#
            );
            sqlx::query(&prune)
                .bind(entity_id)
                .execute(&mut *conn)
                .await
                .map_err(wrap)?;

            if !update_last_snapshot(conn, table, entity_id, version, &state).await? {
                insert_snapshot(conn, table, entity_id, version, &state).await?;
            }
        }
        WriteMode::Compact => {
            let purge = format!("DELETE FROM {quoted} WHERE entity_id = $1");
            sqlx::query(&purge)
                .bind(entity_id)
                .execute(&mut *conn)
                .await
                .map_err(wrap)?;
            insert_snapshot(conn, table, entity_id, version, &state).await?;
        }
        WriteMode::OverwriteLast => {
            if !update_last_snapshot(conn, table, entity_id, version, &state).await? {
                insert_snapshot(conn, table, entity_id, version, &state).await?;
            }
        }
    }

    refresh_latest_flag(conn, table, entity_id).await?;
    debug!(entity_id, version, mode = %mode, "Saved snapshot");
    Ok(())
}

pub(crate) async fn get_last_snapshot<S: EntityState>(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
) -> StoreResult<Option<Snapshot<S>>> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM {} WHERE entity_id = $1 ORDER BY version DESC LIMIT 1",
        quote_ident(table)
    );

    let row = sqlx::query_as::<_, SnapshotRow>(&sql)
        .bind(entity_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(wrap)?;

    row.map(SnapshotRow::decode).transpose()
}

pub(crate) async fn get_snapshot<S: EntityState>(
    conn: &mut PgConnection,
    table: &str,
    entity_id: &str,
    version: i64,
) -> StoreResult<Option<Snapshot<S>>> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM {} WHERE entity_id = $1 AND version = $2",
        quote_ident(table)
    );

    let row = sqlx::query_as::<_, SnapshotRow>(&sql)
        .bind(entity_id)
        .bind(version)
        .fetch_optional(&mut *conn)
        .await
        .map_err(wrap)?;

    row.map(SnapshotRow::decode).transpose()
}

/// State of every row flagged `is_latest`, ordered by entity id.
pub(crate) async fn list_latest_states<S: EntityState>(
    conn: &mut PgConnection,
    table: &str,
) -> StoreResult<Vec<S>> {
    let sql = format!(
        "SELECT state FROM {} WHERE is_latest ORDER BY entity_id",
        quote_ident(table)
    );

    let rows = sqlx::query_as::<_, (serde_json::Value,)>(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(wrap)?;

    rows.into_iter()
        .map(|(state,)| serde_json::from_value(state).map_err(StoreError::from))
        .collect()
}
