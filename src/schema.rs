//! Database schema management for `coldchain-monitor`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the schema if it does not exist (idempotent).
///
/// `products` holds the catalog; the partial unique index on `tag_id` is what
/// makes tag association safe against concurrent requests. `readings` is
/// append-only and is queried by tag and by time, newest first.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id          UUID PRIMARY KEY,
            name        TEXT             NOT NULL,
            tag_id      TEXT,
            min_temp    DOUBLE PRECISION,
            max_temp    DOUBLE PRECISION,
            created_at  TIMESTAMPTZ      NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_products_tag_id
            ON products (tag_id)
            WHERE tag_id IS NOT NULL;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id           UUID PRIMARY KEY,
            tag_id       TEXT             NOT NULL,
            recorded_at  TIMESTAMPTZ      NOT NULL,
            temperature  DOUBLE PRECISION,
            state        TEXT             NOT NULL,
            source       TEXT             NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_tag_id_recorded_at
            ON readings (tag_id, recorded_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_recorded_at
            ON readings (recorded_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
