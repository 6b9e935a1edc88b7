//! Domain models for channels, sync runs and sync results

mod channel;
mod message;
mod outcome;
mod sync_run;

pub use channel::{Channel, ChannelId, SyncCursor};
pub use message::{PersistStats, RawMessage};
pub use outcome::{AggregateSyncResult, SyncMethod, SyncOutcome, SyncReport, SyncRequest};
pub use sync_run::{SyncRun, SyncRunId, SyncRunStatus, SyncSummary};

pub(crate) use outcome::elapsed_seconds;
