use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::kv_store::{KeyValueStore, StoreError};

/// In-process store for development (`DATABASE_URL=memory://`) and tests.
/// Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
    offline: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing service going away / coming back
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryKeyValueStore::new();
        store.put("a:1", "one").await.unwrap();
        store.put("a:1", "uno").await.unwrap();
        store.put("a:2", "two").await.unwrap();
        store.put("b:1", "other").await.unwrap();

        assert_eq!(store.get("a:1").await.unwrap().as_deref(), Some("uno"));
        assert_eq!(
            store.list_keys_by_prefix("a:").await.unwrap(),
            vec!["a:1".to_string(), "a:2".to_string()]
        );
        assert!(store.delete("a:1").await.unwrap());
        assert!(!store.delete("a:1").await.unwrap());
        assert_eq!(store.get("a:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = MemoryKeyValueStore::new();
        store.set_available(false);
        assert!(matches!(
            store.ping().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.put("k", "v").await.is_err());
        store.set_available(true);
        assert!(store.put("k", "v").await.is_ok());
    }
}
