//! Storage traits and implementations
//!
//! Channels, sync runs and persisted messages sit behind two traits so the
//! sync engine can run against an in-memory store in tests and SQLite in
//! production.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemorySyncStore;
pub use sqlite::SqliteSyncStore;
pub use traits::{PersistenceGateway, SyncStore};
