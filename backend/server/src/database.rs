//! # Redis
//!
//! Primary database.
//!
//! ## Layout
//!
//! - `brew:{collection}`: hash of id -> JSON document
//! - `brew:index:{name}`: hash of unique key -> id, written with `HSETNX`
//! - `brew:counter:{name}`: hash of key -> integer, written with `HINCRBY`
//!
//! ## Notes
//! - Stock, loyalty balances and voucher uses are counters, so concurrent checkouts
//!   never read-modify-write a document to move them
//! - Redis queues commands, every `HINCRBY` sees the result of the previous one
//! - Listing reads a whole hash, fine for a menu of a few hundred products
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::info;

use crate::store::{Store, StoreError};

const PREFIX: &str = "brew";

pub async fn init_redis(redis_url: &str) -> Result<RedisStore, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis");

    Ok(RedisStore { connection })
}

pub struct RedisStore {
    connection: ConnectionManager,
}

fn collection_key(collection: &str) -> String {
    format!("{PREFIX}:{collection}")
}

fn index_key(index: &str) -> String {
    format!("{PREFIX}:index:{index}")
}

fn counter_key(counter: &str) -> String {
    format!("{PREFIX}:counter:{counter}")
}

#[async_trait]
impl Store for RedisStore {
    fn backend_tag(&self) -> &'static str {
        "redis"
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(collection_key(collection), id).await?)
    }

    async fn fetch_all(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hvals(collection_key(collection)).await?)
    }

    async fn put(&self, collection: &str, id: &str, doc: String) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection.hset(collection_key(collection), id, doc).await?;

        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let removed: i64 = connection.hdel(collection_key(collection), id).await?;

        Ok(removed > 0)
    }

    async fn claim_index(&self, index: &str, key: &str, id: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hset_nx(index_key(index), key, id).await?)
    }

    async fn lookup_index(&self, index: &str, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(index_key(index), key).await?)
    }

    async fn release_index(&self, index: &str, key: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: i64 = connection.hdel(index_key(index), key).await?;

        Ok(())
    }

    async fn counter(&self, counter: &str, key: &str) -> Result<i64, StoreError> {
        let mut connection = self.connection.clone();
        let value: Option<i64> = connection.hget(counter_key(counter), key).await?;

        Ok(value.unwrap_or(0))
    }

    async fn counters(&self, counter: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hgetall(counter_key(counter)).await?)
    }

    async fn incr_counter(&self, counter: &str, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hincr(counter_key(counter), key, delta).await?)
    }

    async fn set_counter(&self, counter: &str, key: &str, value: i64) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection.hset(counter_key(counter), key, value).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_prefixed() {
        assert_eq!(collection_key("orders"), "brew:orders");
        assert_eq!(index_key("order_step"), "brew:index:order_step");
        assert_eq!(counter_key("stock"), "brew:counter:stock");
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_fast() {
        let started = std::time::Instant::now();
        let result = init_redis("redis://127.0.0.1:1").await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
