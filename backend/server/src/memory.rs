use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::store::{Store, StoreError};

type Keyspace = HashMap<String, BTreeMap<String, String>>;

/// In-process store, used when no `REDIS_URL` is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Keyspace>,
    indexes: Mutex<Keyspace>,
    counters: Mutex<HashMap<String, HashMap<String, i64>>>,
}

#[async_trait]
impl Store for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn fetch_all(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn put(&self, collection: &str, id: &str, doc: String) -> Result<(), StoreError> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);

        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn claim_index(&self, index: &str, key: &str, id: &str) -> Result<bool, StoreError> {
        let mut indexes = self.indexes.lock().await;
        let entries = indexes.entry(index.to_string()).or_default();

        if entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(key.to_string(), id.to_string());

        Ok(true)
    }

    async fn lookup_index(&self, index: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .indexes
            .lock()
            .await
            .get(index)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn release_index(&self, index: &str, key: &str) -> Result<(), StoreError> {
        if let Some(entries) = self.indexes.lock().await.get_mut(index) {
            entries.remove(key);
        }

        Ok(())
    }

    async fn counter(&self, counter: &str, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .counters
            .lock()
            .await
            .get(counter)
            .and_then(|values| values.get(key))
            .copied()
            .unwrap_or(0))
    }

    async fn counters(&self, counter: &str) -> Result<HashMap<String, i64>, StoreError> {
        Ok(self
            .counters
            .lock()
            .await
            .get(counter)
            .cloned()
            .unwrap_or_default())
    }

    async fn incr_counter(&self, counter: &str, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters.lock().await;
        let value = counters
            .entry(counter.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(0);

        *value += delta;

        Ok(*value)
    }

    async fn set_counter(&self, counter: &str, key: &str, value: i64) -> Result<(), StoreError> {
        self.counters
            .lock()
            .await
            .entry(counter.to_string())
            .or_default()
            .insert(key.to_string(), value);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_index_is_claimed_once() {
        let store = MemoryStore::default();

        assert!(store.claim_index("email", "a@b.c", "1").await.unwrap());
        assert!(!store.claim_index("email", "a@b.c", "2").await.unwrap());
        assert_eq!(store.lookup_index("email", "a@b.c").await.unwrap().as_deref(), Some("1"));

        store.release_index("email", "a@b.c").await.unwrap();
        assert!(store.claim_index("email", "a@b.c", "2").await.unwrap());
    }

    #[tokio::test]
    async fn test_documents() {
        let store = MemoryStore::default();

        store.put("products", "p1", "{}".to_string()).await.unwrap();
        assert_eq!(store.fetch_all("products").await.unwrap().len(), 1);
        assert!(store.remove("products", "p1").await.unwrap());
        assert!(!store.remove("products", "p1").await.unwrap());
        assert!(store.fetch("products", "p1").await.unwrap().is_none());
    }
}
