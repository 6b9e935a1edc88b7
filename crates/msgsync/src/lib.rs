//! msgsync - Incremental message sync from external channels
//!
//! This crate keeps a local store in step with external message channels
//! (mailbox-style providers):
//! - Domain models (Channel, SyncRun, SyncOutcome)
//! - Channel adapter and persistence gateway traits
//! - Storage for channels and sync runs (in-memory and SQLite)
//! - Sync engine choosing between cursor (history) and watermark
//!   (timestamp) fetches, with per-run audit records
//!
//! Adapters, the persistence gateway and the store are injected; the crate
//! holds no process-wide state.

pub mod adapter;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod sync;

pub use adapter::{AdapterRegistry, AdapterResolver, ChannelAdapter, FetchResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use models::{
    AggregateSyncResult, Channel, ChannelId, PersistStats, RawMessage, SyncCursor, SyncMethod,
    SyncOutcome, SyncReport, SyncRequest, SyncRun, SyncRunId, SyncRunStatus, SyncSummary,
};
pub use storage::{InMemorySyncStore, PersistenceGateway, SqliteSyncStore, SyncStore};
pub use sync::{ChannelLocks, StrategySelector, SyncLogRecorder, SyncOrchestrator};
