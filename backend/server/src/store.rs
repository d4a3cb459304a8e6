//! # Store
//!
//! Document store behind the API. Three kinds of keyspaces:
//!
//! - **Collections**: id -> JSON document
//! - **Indexes**: unique key -> id (emails, SKUs, slugs, voucher codes), claimed with set-if-absent
//! - **Counters**: key -> integer, changed only by atomic increments
//!
//! Backends: [`crate::database::RedisStore`] for deployments, [`crate::memory::MemoryStore`]
//! for local runs and tests.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

pub mod collections {
    pub const PRODUCTS: &str = "products";
    pub const CUSTOMERS: &str = "customers";
    pub const CARTS: &str = "carts";
    pub const ORDERS: &str = "orders";
    pub const VOUCHERS: &str = "vouchers";
    pub const REVIEWS: &str = "reviews";
    pub const LOYALTY: &str = "loyalty";
}

pub mod indexes {
    pub const PRODUCT_SKU: &str = "product_sku";
    pub const PRODUCT_SLUG: &str = "product_slug";
    pub const CUSTOMER_EMAIL: &str = "customer_email";
    pub const VOUCHER_CODE: &str = "voucher_code";
    /// `{product_id}:{customer_id}` -> review id
    pub const REVIEW_AUTHOR: &str = "review_author";
    pub const ORDER_NUMBER: &str = "order_number";
    /// `{order_id}:{status}` -> next status, claimed by the one move out of that status.
    pub const ORDER_STEP: &str = "order_step";
}

pub mod counters {
    pub const STOCK: &str = "stock";
    pub const POINTS: &str = "points";
    pub const VOUCHER_USES: &str = "voucher_uses";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt document: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError>;

    async fn fetch_all(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    async fn put(&self, collection: &str, id: &str, doc: String) -> Result<(), StoreError>;

    /// Returns whether something was removed.
    async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Maps `key` to `id` unless the key is already taken. Returns whether it was claimed.
    async fn claim_index(&self, index: &str, key: &str, id: &str) -> Result<bool, StoreError>;

    async fn lookup_index(&self, index: &str, key: &str) -> Result<Option<String>, StoreError>;

    async fn release_index(&self, index: &str, key: &str) -> Result<(), StoreError>;

    /// Missing counters read as zero.
    async fn counter(&self, counter: &str, key: &str) -> Result<i64, StoreError>;

    async fn counters(&self, counter: &str) -> Result<HashMap<String, i64>, StoreError>;

    /// Atomic add, returns the new value.
    async fn incr_counter(&self, counter: &str, key: &str, delta: i64) -> Result<i64, StoreError>;

    async fn set_counter(&self, counter: &str, key: &str, value: i64) -> Result<(), StoreError>;
}

/// Typed access on top of a [`Store`].
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn Store>,
}

impl Db {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub async fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.store.fetch(collection, id).await? {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn load_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        self.store
            .fetch_all(collection)
            .await?
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
            .collect()
    }

    pub async fn load_many<T: DeserializeOwned>(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<T>, StoreError> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.load(collection, id).await? {
                docs.push(doc);
            }
        }

        Ok(docs)
    }

    pub async fn save<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        self.store
            .put(collection, id, serde_json::to_string(doc)?)
            .await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.store.remove(collection, id).await
    }

    pub async fn find_by_index<T: DeserializeOwned>(
        &self,
        index: &str,
        key: &str,
        collection: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.store.lookup_index(index, key).await? {
            Some(id) => self.load(collection, &id).await,
            None => Ok(None),
        }
    }

    pub async fn count(&self, counter: &str, key: &str) -> Result<u64, StoreError> {
        Ok(self.store.counter(counter, key).await?.max(0) as u64)
    }

    /// Takes `amount` off a counter. If that would go below zero the decrement is
    /// undone and `false` is returned.
    pub async fn reserve(&self, counter: &str, key: &str, amount: u64) -> Result<bool, StoreError> {
        let amount = amount as i64;
        let remaining = self.store.incr_counter(counter, key, -amount).await?;

        if remaining < 0 {
            self.store.incr_counter(counter, key, amount).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Counterpart of [`Db::reserve`] against an upper bound: adds `amount` unless the
    /// result would exceed `limit`.
    pub async fn claim_within(
        &self,
        counter: &str,
        key: &str,
        amount: u64,
        limit: Option<u64>,
    ) -> Result<bool, StoreError> {
        let amount = amount as i64;
        let used = self.store.incr_counter(counter, key, amount).await?;

        if limit.is_some_and(|limit| used > limit as i64) {
            self.store.incr_counter(counter, key, -amount).await?;
            return Ok(false);
        }

        Ok(true)
    }

    pub async fn release(&self, counter: &str, key: &str, amount: u64) -> Result<u64, StoreError> {
        let value = self.store.incr_counter(counter, key, amount as i64).await?;

        Ok(value.max(0) as u64)
    }

    pub async fn unclaim(&self, counter: &str, key: &str, amount: u64) -> Result<(), StoreError> {
        self.store.incr_counter(counter, key, -(amount as i64)).await?;

        Ok(())
    }
}
