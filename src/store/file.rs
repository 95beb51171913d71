use crate::error::{Result, SyringeError};
use crate::store::kv::{KeyValueStore, StoreArea, StoreChange};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, broadcast};

/// Key-value store persisted as one pretty-printed JSON object on disk.
///
/// Every write rewrites the whole file, so a reader never observes a partial update
/// of a single key.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    area: StoreArea,
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open a store, starting empty if the file does not exist yet
    pub async fn open(path: impl AsRef<Path>, area: StoreArea) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                _ => {
                    return Err(SyringeError::Storage(format!(
                        "{} does not contain a JSON object",
                        path.display()
                    )));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        log::debug!("Opened {} with {} keys", path.display(), values.len());
        let (changes, _) = broadcast::channel(16);
        Ok(Self {
            path,
            area,
            values: Mutex::new(values),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| SyringeError::Storage(format!("Failed to write {}: {}", self.path.display(), e)))
    }

    fn notify(&self, key: &str, new_value: Option<Value>) {
        let _ = self.changes.send(StoreChange {
            area: self.area,
            key: key.to_string(),
            new_value,
        });
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    fn area(&self) -> StoreArea {
        self.area
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value.clone());
        self.persist(&values).await?;
        drop(values);
        self.notify(key, Some(value));
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.values.lock().await;
        let removed: Vec<&str> = keys.iter().copied().filter(|k| values.remove(*k).is_some()).collect();
        if removed.is_empty() {
            return Ok(());
        }
        self.persist(&values).await?;
        drop(values);
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

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dom-syringe-{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        let store = JsonFileStore::open(&path, StoreArea::Sync).await.unwrap();
        store.set("copyItems", json!([{"id": "1"}])).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path, StoreArea::Sync).await.unwrap();
        assert_eq!(reopened.get("copyItems").await.unwrap(), Some(json!([{"id": "1"}])));

        reopened.remove(&["copyItems"]).await.unwrap();
        assert_eq!(reopened.get("copyItems").await.unwrap(), None);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_rejects_non_object_file() {
        let path = temp_path("array");
        std::fs::write(&path, "[1, 2]").unwrap();

        let result = JsonFileStore::open(&path, StoreArea::Sync).await;
        assert!(matches!(result, Err(SyringeError::Storage(_))));
        let _ = std::fs::remove_file(&path);
    }
}
