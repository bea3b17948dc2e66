pub mod config;
pub mod database;
pub mod errors;
pub mod memory;
pub mod models;
pub mod record_store;

pub use database::Database;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use models::{RecipePatch, RecipeRepository};
pub use record_store::{Record, RecordStore};
