use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::{StoreError, StoreResult};

/// A stored document. Its `id` field is the primary key.
pub type Record = Map<String, Value>;

pub const KEY_FIELD: &str = "id";

/// Generic id-keyed persistence for whole JSON records.
///
/// `update` merges: fields present in `data` replace the stored ones and
/// every other stored field is kept. Writers touching different fields of
/// the same record therefore never clobber each other.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return its key. A missing `id` is minted.
    async fn create(&self, data: Record) -> StoreResult<String>;

    async fn read(&self, key: &str) -> StoreResult<Option<Record>>;

    async fn read_all(&self) -> StoreResult<Vec<Record>>;

    /// Merge `data` into the record stored under `key`, creating it if absent.
    async fn update(&self, key: &str, data: Record) -> StoreResult<String>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Drop every record.
    async fn erase(&self) -> StoreResult<()>;
}

/// Return the record's key, minting and inserting one if it has none.
pub fn ensure_key(data: &mut Record) -> StoreResult<String> {
    match data.get(KEY_FIELD) {
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(Value::String(_)) | None => {
            let key = uuid::Uuid::new_v4().to_string();
            data.insert(KEY_FIELD.into(), Value::String(key.clone()));
            Ok(key)
        }
        Some(other) => Err(StoreError::InvalidRecord(format!(
            "record key must be a string, got {other}"
        ))),
    }
}

/// Shallow merge of `data` over `existing`, pinning the key.
pub fn merge_fields(existing: Option<Record>, data: Record, key: &str) -> Record {
    let mut merged = existing.unwrap_or_default();
    merged.extend(data);
    merged.insert(KEY_FIELD.into(), Value::String(key.to_string()));
    merged
}
