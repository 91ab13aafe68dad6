//! PostgreSQL implementation of the product and reading stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ProductStore, ReadingStore, StoreError, StoreResult};
use crate::models::{
    NewProduct, Product, ProductUpdate, Reading, TagSummary, TemperatureRange, UnknownVariant,
};

const PRODUCT_COLUMNS: &str = "id, name, tag_id, min_temp, max_temp";
const READING_COLUMNS: &str = "id, tag_id, recorded_at, temperature, state, source";

// ---

/// Both stores over one connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    // ---
    id: Uuid,
    name: String,
    tag_id: Option<String>,
    min_temp: Option<f64>,
    max_temp: Option<f64>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            tag_id: row.tag_id,
            acceptable_range: TemperatureRange {
                min: row.min_temp,
                max: row.max_temp,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    // ---
    id: Uuid,
    tag_id: String,
    recorded_at: DateTime<Utc>,
    temperature: Option<f64>,
    state: String,
    source: String,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = StoreError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        // ---
        let decode = |e: UnknownVariant| StoreError::Database(sqlx::Error::Decode(Box::new(e)));
        Ok(Reading {
            id: row.id,
            tag_id: row.tag_id,
            timestamp: row.recorded_at,
            temperature: row.temperature,
            state: row.state.parse().map_err(decode)?,
            source: row.source.parse().map_err(decode)?,
        })
    }
}

fn into_readings(rows: Vec<ReadingRow>) -> StoreResult<Vec<Reading>> {
    rows.into_iter().map(Reading::try_from).collect()
}

/// Map a unique-index violation on `products.tag_id` to [`StoreError::TagTaken`].
fn tag_conflict(tag_id: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| {
        if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
            StoreError::TagTaken {
                tag_id: tag_id.to_string(),
            }
        } else {
            StoreError::Database(e)
        }
    }
}

// ---

#[async_trait]
impl ProductStore for PgStore {
    // ---
    async fn list(&self, limit: i64) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Product::from))
    }

    async fn find_by_tag(&self, tag_id: &str) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE tag_id = $1"
        ))
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn create(&self, product: NewProduct) -> StoreResult<Product> {
        // ---
        if let Some(tag_id) = product.tag_id.as_deref() {
            if self.find_by_tag(tag_id).await?.is_some() {
                return Err(StoreError::TagTaken {
                    tag_id: tag_id.to_string(),
                });
            }
        }

        let tag_id = product.tag_id.clone().unwrap_or_default();
        let row: ProductRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO products (id, name, tag_id, min_temp, max_temp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&product.name)
        .bind(&product.tag_id)
        .bind(product.acceptable_range.min)
        .bind(product.acceptable_range.max)
        .fetch_one(&self.pool)
        .await
        .map_err(tag_conflict(&tag_id))?;

        Ok(row.into())
    }

    async fn update(&self, id: Uuid, update: ProductUpdate) -> StoreResult<Product> {
        // ---
        let range = update.acceptable_range;
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            r#"
            UPDATE products SET
                name     = COALESCE($2, name),
                min_temp = CASE WHEN $3 THEN $4 ELSE min_temp END,
                max_temp = CASE WHEN $3 THEN $5 ELSE max_temp END
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.name)
        .bind(range.is_some())
        .bind(range.and_then(|r| r.min))
        .bind(range.and_then(|r| r.max))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::from).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_tag(&self, id: Uuid, tag_id: &str) -> StoreResult<Product> {
        // ---
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "UPDATE products SET tag_id = $2 WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(tag_conflict(tag_id))?;

        row.map(Product::from).ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    // ---
    async fn insert(&self, reading: &Reading) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (id, tag_id, recorded_at, temperature, state, source)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reading.id)
        .bind(&reading.tag_id)
        .bind(reading.timestamp)
        .bind(reading.temperature)
        .bind(reading.state.as_str())
        .bind(reading.source.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, limit: i64) -> StoreResult<Vec<Reading>> {
        let rows: Vec<ReadingRow> = sqlx::query_as(&format!(
            "SELECT {READING_COLUMNS} FROM readings ORDER BY recorded_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_readings(rows)
    }

    async fn list_by_tag(&self, tag_id: &str, limit: i64) -> StoreResult<Vec<Reading>> {
        let rows: Vec<ReadingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {READING_COLUMNS} FROM readings
            WHERE tag_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#
        ))
        .bind(tag_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_readings(rows)
    }

    async fn latest_for_tag(&self, tag_id: &str) -> StoreResult<Option<Reading>> {
        Ok(self.list_by_tag(tag_id, 1).await?.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM readings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn tag_summaries(&self) -> StoreResult<Vec<TagSummary>> {
        let rows: Vec<TagSummary> = sqlx::query_as(
            r#"
            SELECT tag_id,
                   MAX(recorded_at) AS last_timestamp,
                   COUNT(*)         AS count
            FROM readings
            GROUP BY tag_id
            ORDER BY last_timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
