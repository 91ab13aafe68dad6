//! Persistence boundary for products and readings.
//!
//! The ingestion core and the HTTP routes depend only on the two traits here.
//! `postgres` is the production implementation; `memory` backs the tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewProduct, Product, ProductUpdate, Reading, TagSummary};

mod postgres;

#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

/// Default page size for product and reading listings.
pub const LIST_LIMIT: i64 = 100;

/// Page size for per-tag reading listings.
pub const TAG_LIST_LIMIT: i64 = 50;

// ---

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("tag '{tag_id}' is already associated with another product")]
    TagTaken { tag_id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Product catalog. Also serves as the ingestion path's product lookup.
#[async_trait]
pub trait ProductStore: Send + Sync {
    // ---
    async fn list(&self, limit: i64) -> StoreResult<Vec<Product>>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>>;

    /// The product currently holding `tag_id`, if any.
    async fn find_by_tag(&self, tag_id: &str) -> StoreResult<Option<Product>>;

    /// Insert a product. Fails with [`StoreError::TagTaken`] when the tag is
    /// already held.
    async fn create(&self, product: NewProduct) -> StoreResult<Product>;

    async fn update(&self, id: Uuid, update: ProductUpdate) -> StoreResult<Product>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Set the tag of product `id` unconditionally, apart from the store's own
    /// uniqueness constraint. Use [`associate_tag`] for the checked operation.
    async fn set_tag(&self, id: Uuid, tag_id: &str) -> StoreResult<Product>;
}

/// Append-only reading log.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    // ---
    async fn insert(&self, reading: &Reading) -> StoreResult<()>;

    /// Newest first.
    async fn list(&self, limit: i64) -> StoreResult<Vec<Reading>>;

    /// Newest first.
    async fn list_by_tag(&self, tag_id: &str, limit: i64) -> StoreResult<Vec<Reading>>;

    async fn latest_for_tag(&self, tag_id: &str) -> StoreResult<Option<Reading>>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Per-tag counts and last timestamp over all readings, newest tag first.
    async fn tag_summaries(&self) -> StoreResult<Vec<TagSummary>>;
}

// ---

/// Associate `tag_id` with product `id`, refusing if another product holds it.
///
/// The check is a read followed by a write. Two concurrent requests for the
/// same tag can both pass the read; the store's unique constraint then fails
/// the second write with [`StoreError::TagTaken`], so neither product is left
/// in a state the caller did not see reported.
pub async fn associate_tag(
    products: &dyn ProductStore,
    id: Uuid,
    tag_id: &str,
) -> StoreResult<Product> {
    // ---
    let product = products.get(id).await?.ok_or(StoreError::NotFound)?;

    if product.tag_id.as_deref() == Some(tag_id) {
        return Ok(product);
    }

    if let Some(holder) = products.find_by_tag(tag_id).await? {
        if holder.id != id {
            tracing::info!(
                "Refusing to associate tag {} with {}: held by {}",
                tag_id,
                id,
                holder.id
            );
            return Err(StoreError::TagTaken {
                tag_id: tag_id.to_string(),
            });
        }
    }

    products.set_tag(id, tag_id).await
}
