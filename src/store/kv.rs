use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 64;

/// Which persistent store a key lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreArea {
    /// Synced across the user's browsers; holds the catalog
    Sync,

    /// Local to this browser; holds transient recovery records
    Local,
}

/// Notification that a key was written or removed
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub area: StoreArea,
    pub key: String,
    pub new_value: Option<Value>,
}

/// Asynchronous JSON key-value store with change notifications
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn area(&self) -> StoreArea;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove several keys in one operation; missing keys are ignored
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Read and deserialize a key
pub async fn read<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a key
pub async fn write<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

/// Store held in memory
#[derive(Debug)]
pub struct MemoryStore {
    area: StoreArea,
    values: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new(area: StoreArea) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            area,
            values: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keys currently present
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn notify(&self, key: &str, new_value: Option<Value>) {
        // Nobody listening is fine
        let _ = self.changes.send(StoreChange {
            area: self.area,
            key: key.to_string(),
            new_value,
        });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn area(&self) -> StoreArea {
        self.area
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values().insert(key.to_string(), value.clone());
        self.notify(key, Some(value));
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let removed: Vec<&str> = {
            let mut values = self.values();
            keys.iter().copied().filter(|k| values.remove(*k).is_some()).collect()
        };
        for key in removed {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new(StoreArea::Local);
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!("two")).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));

        store.remove(&["a", "missing"]).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryStore::new(StoreArea::Sync);
        write(&store, "list", &vec![1, 2, 3]).await.unwrap();
        let list: Option<Vec<u32>> = read(&store, "list").await.unwrap();
        assert_eq!(list, Some(vec![1, 2, 3]));

        store.set("bad", json!("nope")).await.unwrap();
        assert!(read::<Vec<u32>>(&store, "bad").await.is_err());
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = MemoryStore::new(StoreArea::Sync);
        let mut changes = store.subscribe();

        store.set("copyItems", json!([])).await.unwrap();
        store.remove(&["copyItems"]).await.unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.key, "copyItems");
        assert_eq!(first.area, StoreArea::Sync);
        assert_eq!(changes.recv().await.unwrap().new_value, None);
    }
}
