//! Sync run audit log

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{ChannelId, PersistStats, SyncRun, SyncSummary};
use crate::storage::SyncStore;

/// Opens and finalizes sync run records
///
/// Transitions are applied to a copy and only written back to the caller's
/// run once the store accepted them, so a failed write never leaves the
/// in-memory run ahead of the stored one.
#[derive(Clone)]
pub struct SyncLogRecorder {
    store: Arc<dyn SyncStore>,
    clock: Arc<dyn Clock>,
}

impl SyncLogRecorder {
    pub fn new(store: Arc<dyn SyncStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a `running` record for a channel
    pub fn start(&self, channel_id: ChannelId) -> Result<SyncRun> {
        let mut run = SyncRun::start(channel_id, self.clock.now());
        run.id = self.store.insert_run(&run)?;
        Ok(run)
    }

    /// Finalize a run as `completed`
    pub fn complete(
        &self,
        run: &mut SyncRun,
        messages_fetched: usize,
        stats: PersistStats,
        summary: SyncSummary,
    ) -> Result<()> {
        let mut next = run.clone();
        next.complete(messages_fetched, stats, summary, self.clock.now())?;
        self.store.update_run(&next)?;
        *run = next;
        Ok(())
    }

    /// Finalize a run as `failed`
    pub fn fail(&self, run: &mut SyncRun, error: &str) -> Result<()> {
        let mut next = run.clone();
        next.fail(error, self.clock.now())?;
        self.store.update_run(&next)?;
        *run = next;
        Ok(())
    }

    /// Past runs for a channel, newest first
    pub fn history(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<SyncRun>> {
        Ok(self.store.list_runs(channel_id, limit)?)
    }
}
