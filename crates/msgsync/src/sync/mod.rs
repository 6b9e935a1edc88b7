//! Sync engine for fetching and storing channel messages
//!
//! The orchestrator picks a strategy per channel: history (delta fetch from
//! a provider cursor) when the cursor is fresh, otherwise timestamp (fetch
//! since a watermark). A failed history fetch degrades to timestamp within
//! the same run. Every attempt is audited as a sync run.

mod history;
mod locks;
mod orchestrator;
mod recorder;
mod selector;
mod timestamp;

#[cfg(test)]
mod testing;

pub use locks::ChannelLocks;
pub use orchestrator::SyncOrchestrator;
pub use recorder::SyncLogRecorder;
pub use selector::StrategySelector;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::storage::{PersistenceGateway, SyncStore};

/// Collaborators a strategy needs for one run
pub(crate) struct StrategyContext<'a> {
    pub store: &'a dyn SyncStore,
    pub gateway: &'a dyn PersistenceGateway,
    pub recorder: &'a SyncLogRecorder,
    pub clock: &'a dyn Clock,
    pub config: &'a SyncConfig,
}
