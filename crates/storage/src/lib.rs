pub mod error;
pub mod kv;
pub mod repository;
pub mod sqlite;

pub use error::StorageError;
pub use kv::{KeyValueStore, MemoryStore};
pub use repository::{CompanyExport, CompanyRepository, RecordKind, KEY_PREFIX};
pub use sqlite::{create_db, DbPool, SqliteStore};
