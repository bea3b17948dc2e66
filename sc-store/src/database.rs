use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::errors::{StoreError, StoreResult};
use crate::record_store::{ensure_key, merge_fields, Record, RecordStore};

pub fn sqlite_current_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// SQLite-backed record store. Each record is one JSON document in the `Record` table.
#[derive(Clone)]
pub struct Database {
    pub pool: r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database file at `path` and bring its schema up to date.
    pub fn connect(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let manager = r2d2_sqlite::SqliteConnectionManager::file(path);
        let pool = r2d2::Pool::new(manager)?;
        let me = Self { pool };
        me.migrate()?;
        Ok(me)
    }

    /// Migrate the database to the latest version.
    fn migrate(&self) -> StoreResult<()> {
        let migrations = [
            include_str!("migrations/01-initial.sql"),
            include_str!("migrations/02-created-on-index.sql"),
        ];
        // Find the current migration version. If it fails, we need to run all the migrations.
        let conn = self.pool.get()?;
        let current_version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                params![],
                |row| row.get(0),
            )
            .unwrap_or("0".to_string());
        let current_version = current_version.parse::<usize>().unwrap_or(0);
        tracing::debug!("Current schema version: {}", current_version);
        for migration in migrations.iter().skip(current_version) {
            tracing::warn!("Applying migration: {}", migration);
            conn.execute_batch(migration)?;
        }
        Ok(())
    }

    /// Convenience method to collect rows from a query into a Vec.
    pub fn collect_rows<T: FromRow, P: rusqlite::Params>(
        &self,
        sql: &str,
        parameters: P,
    ) -> StoreResult<Vec<T>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query(parameters)?;
        rows.mapped(T::from_row)
            .map(|r| r.map_err(Into::into))
            .collect::<StoreResult<_>>()
    }

    fn create_blocking(&self, mut data: Record) -> StoreResult<String> {
        let key = ensure_key(&mut data)?;
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO Record (record_id, content_json, created_on) VALUES (?, ?, ?)",
            params![key, serde_json::to_string(&data)?, sqlite_current_timestamp()],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(key));
        }
        Ok(key)
    }

    fn update_blocking(&self, key: &str, data: Record) -> StoreResult<String> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT content_json FROM Record WHERE record_id = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        let existing = existing
            .map(|text| serde_json::from_str::<Record>(&text))
            .transpose()?;
        let merged = merge_fields(existing, data, key);
        tx.execute(
            "INSERT INTO Record (record_id, content_json, created_on) VALUES (?1, ?2, ?3)
            ON CONFLICT (record_id) DO UPDATE SET content_json = excluded.content_json",
            params![key, serde_json::to_string(&merged)?, sqlite_current_timestamp()],
        )?;
        tx.commit()?;
        Ok(key.to_string())
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn create(&self, data: Record) -> StoreResult<String> {
        self.create_blocking(data)
    }

    async fn read(&self, key: &str) -> StoreResult<Option<Record>> {
        Ok(self
            .collect_rows::<StoredRecord, _>(
                "SELECT * FROM Record WHERE record_id = ?",
                params![key],
            )?
            .pop()
            .map(|row| row.content))
    }

    async fn read_all(&self) -> StoreResult<Vec<Record>> {
        Ok(self
            .collect_rows::<StoredRecord, _>("SELECT * FROM Record ORDER BY created_on", [])?
            .into_iter()
            .map(|row| row.content)
            .collect())
    }

    async fn update(&self, key: &str, data: Record) -> StoreResult<String> {
        self.update_blocking(key, data)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM Record WHERE record_id = ?", params![key])?;
        Ok(())
    }

    async fn erase(&self) -> StoreResult<()> {
        let conn = self.pool.get()?;
        let dropped = conn.execute("DELETE FROM Record", [])?;
        tracing::info!("Erased {} records", dropped);
        Ok(())
    }
}

pub trait FromRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self>
    where
        Self: Sized;
}

/// A raw row of the `Record` table with its JSON content decoded.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record_id: String,
    pub created_on: String,
    pub content: Record,
}

impl FromRow for StoredRecord {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let content_text: String = row.get("content_json")?;
        let content = serde_json::from_str(&content_text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Self {
            record_id: row.get("record_id")?,
            created_on: row.get("created_on")?,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn open(dir: &TempDir) -> Database {
        Database::connect(dir.path().join("data").join("recipes.db")).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);

        let key = db
            .create(record(json!({"id": "r1", "name": "Soto Ayam"})))
            .await
            .unwrap();
        assert_eq!(key, "r1");

        let stored = db.read("r1").await.unwrap().unwrap();
        assert_eq!(stored["name"], "Soto Ayam");
        assert!(db.read("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        db.create(record(json!({"id": "r1"}))).await.unwrap();
        let err = db.create(record(json!({"id": "r1"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(key) if key == "r1"));
    }

    #[tokio::test]
    async fn test_field_updates_merge() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        db.create(record(json!({"id": "r1", "name": "Soto Ayam"})))
            .await
            .unwrap();

        db.update("r1", record(json!({"ingredients": ["chicken"]})))
            .await
            .unwrap();
        db.update("r1", record(json!({"tools": ["wok"]})))
            .await
            .unwrap();

        let stored = db.read("r1").await.unwrap().unwrap();
        assert_eq!(
            Value::Object(stored),
            json!({"id": "r1", "name": "Soto Ayam", "ingredients": ["chicken"], "tools": ["wok"]})
        );
    }

    #[tokio::test]
    async fn test_migrations_are_not_reapplied() {
        let dir = TempDir::new().unwrap();
        open(&dir)
            .create(record(json!({"id": "r1"})))
            .await
            .unwrap();
        // Reopening must keep the data and the schema version.
        let db = open(&dir);
        assert_eq!(db.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_erase() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        for id in ["a", "b", "c"] {
            db.create(record(json!({ "id": id }))).await.unwrap();
        }
        db.delete("a").await.unwrap();
        assert_eq!(db.read_all().await.unwrap().len(), 2);
        db.erase().await.unwrap();
        assert!(db.read_all().await.unwrap().is_empty());
    }
}
