//! In-memory stores for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ProductStore, ReadingStore, StoreError, StoreResult};
use crate::models::{NewProduct, Product, ProductUpdate, Reading, TagSummary};

#[derive(Debug, Default)]
pub struct MemoryStore {
    // ---
    products: Mutex<Vec<Product>>,
    readings: Mutex<Vec<Reading>>,
    /// When set, every reading insert fails.
    pub fail_inserts: AtomicBool,
}

impl MemoryStore {
    // ---
    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }

    fn newest_first(mut readings: Vec<Reading>, limit: i64) -> Vec<Reading> {
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings.truncate(limit.max(0) as usize);
        readings
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    // ---
    async fn list(&self, limit: i64) -> StoreResult<Vec<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products.iter().take(limit.max(0) as usize).cloned().collect())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_tag(&self, tag_id: &str) -> StoreResult<Option<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products
            .iter()
            .find(|p| p.tag_id.as_deref() == Some(tag_id))
            .cloned())
    }

    async fn create(&self, product: NewProduct) -> StoreResult<Product> {
        // ---
        let mut products = self.products.lock().unwrap();
        if let Some(tag_id) = product.tag_id.as_deref() {
            if products.iter().any(|p| p.tag_id.as_deref() == Some(tag_id)) {
                return Err(StoreError::TagTaken {
                    tag_id: tag_id.to_string(),
                });
            }
        }

        let created = Product {
            id: Uuid::new_v4(),
            name: product.name,
            tag_id: product.tag_id,
            acceptable_range: product.acceptable_range,
        };
        products.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: ProductUpdate) -> StoreResult<Product> {
        // ---
        let mut products = self.products.lock().unwrap();
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;

        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(range) = update.acceptable_range {
            product.acceptable_range = range;
        }
        Ok(product.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut products = self.products.lock().unwrap();
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_tag(&self, id: Uuid, tag_id: &str) -> StoreResult<Product> {
        // ---
        let mut products = self.products.lock().unwrap();
        if products
            .iter()
            .any(|p| p.id != id && p.tag_id.as_deref() == Some(tag_id))
        {
            return Err(StoreError::TagTaken {
                tag_id: tag_id.to_string(),
            });
        }

        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;
        product.tag_id = Some(tag_id.to_string());
        Ok(product.clone())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    // ---
    async fn insert(&self, reading: &Reading) -> StoreResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.readings.lock().unwrap().push(reading.clone());
        Ok(())
    }

    async fn list(&self, limit: i64) -> StoreResult<Vec<Reading>> {
        Ok(Self::newest_first(self.readings(), limit))
    }

    async fn list_by_tag(&self, tag_id: &str, limit: i64) -> StoreResult<Vec<Reading>> {
        let matching = self
            .readings()
            .into_iter()
            .filter(|r| r.tag_id == tag_id)
            .collect();
        Ok(Self::newest_first(matching, limit))
    }

    async fn latest_for_tag(&self, tag_id: &str) -> StoreResult<Option<Reading>> {
        Ok(self.list_by_tag(tag_id, 1).await?.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut readings = self.readings.lock().unwrap();
        let before = readings.len();
        readings.retain(|r| r.id != id);
        if readings.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn tag_summaries(&self) -> StoreResult<Vec<TagSummary>> {
        // ---
        let mut by_tag: HashMap<String, TagSummary> = HashMap::new();
        for r in self.readings() {
            let entry = by_tag.entry(r.tag_id.clone()).or_insert_with(|| TagSummary {
                tag_id: r.tag_id.clone(),
                last_timestamp: None,
                count: 0,
            });
            entry.count += 1;
            entry.last_timestamp = entry.last_timestamp.max(Some(r.timestamp));
        }

        let mut summaries: Vec<TagSummary> = by_tag.into_values().collect();
        summaries.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
        Ok(summaries)
    }
}
