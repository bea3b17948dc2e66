pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Record encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Record {0} already exists")]
    Duplicate(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Could not create the database directory: {0}")]
    Io(#[from] std::io::Error),
}
