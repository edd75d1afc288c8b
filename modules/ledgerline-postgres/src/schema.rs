//! Table bootstrap. Every statement is idempotent.

use ledgerline_events::StoreResult;
use sqlx::PgConnection;

use crate::error::wrap;

/// Quote a table or index name for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Event log table. `(entity_id, sequence)` is the primary key; the
/// uniqueness violation on it is how a lost append race is detected.
pub async fn create_event_table(conn: &mut PgConnection, table: &str) -> StoreResult<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            entity_id    TEXT         NOT NULL,
            sequence     BIGINT       NOT NULL,
            name         TEXT         NOT NULL,
            payload      JSONB        NOT NULL,
            appended_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
            PRIMARY KEY (entity_id, sequence)
        )
        "#,
        table = quote_ident(table),
    );

    sqlx::query(&sql).execute(&mut *conn).await.map_err(wrap)?;
    Ok(())
}

/// Snapshot table plus a partial unique index that allows at most one
/// `is_latest` row per entity.
pub async fn create_snapshot_table(conn: &mut PgConnection, table: &str) -> StoreResult<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            entity_id   TEXT         NOT NULL,
            version     BIGINT       NOT NULL,
            state       JSONB        NOT NULL,
            is_latest   BOOLEAN      NOT NULL DEFAULT FALSE,
            created_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
            PRIMARY KEY (entity_id, version)
        )
        "#,
        table = quote_ident(table),
    );
    sqlx::query(&sql).execute(&mut *conn).await.map_err(wrap)?;

    let index = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} (entity_id) WHERE is_latest",
        index = quote_ident(&format!("{table}_latest_idx")),
        table = quote_ident(table),
    );
    sqlx::query(&index)
        .execute(&mut *conn)
        .await
        .map_err(wrap)?;

    Ok(())
}
