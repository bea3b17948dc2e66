use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{StoreError, StoreResult};
use crate::record_store::{ensure_key, merge_fields, Record, RecordStore};

/// A record store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, mut data: Record) -> StoreResult<String> {
        let key = ensure_key(&mut data)?;
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(StoreError::Duplicate(key));
        }
        records.insert(key.clone(), data);
        Ok(key)
    }

    async fn read(&self, key: &str) -> StoreResult<Option<Record>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn read_all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn update(&self, key: &str, data: Record) -> StoreResult<String> {
        let mut records = self.records.write().await;
        let merged = merge_fields(records.remove(key), data, key);
        records.insert(key.to_string(), merged);
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn erase(&self) -> StoreResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
