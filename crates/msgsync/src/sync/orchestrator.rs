//! Top-level sync entry points

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use rayon::prelude::*;

use super::history::sync_via_history;
use super::timestamp::sync_via_timestamp;
use super::{ChannelLocks, StrategyContext, StrategySelector, SyncLogRecorder};
use crate::adapter::AdapterResolver;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{
    AggregateSyncResult, Channel, ChannelId, SyncMethod, SyncOutcome, SyncReport, SyncRequest,
    SyncRun, elapsed_seconds,
};
use crate::storage::{PersistenceGateway, SyncStore};

/// Syncs one channel or every active channel
///
/// All collaborators are injected. The orchestrator is the only place a
/// failed attempt is turned into a `failed` sync run; strategies just
/// return errors.
pub struct SyncOrchestrator {
    store: Arc<dyn SyncStore>,
    adapters: Arc<dyn AdapterResolver>,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    recorder: SyncLogRecorder,
    config: SyncConfig,
    locks: ChannelLocks,
}

impl SyncOrchestrator {
    /// Create an orchestrator on the system clock with default config
    pub fn new(
        store: Arc<dyn SyncStore>,
        adapters: Arc<dyn AdapterResolver>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = SyncConfig::default();
        Self {
            recorder: SyncLogRecorder::new(store.clone(), clock.clone()),
            store,
            adapters,
            gateway,
            clock,
            config,
            locks: ChannelLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.recorder = SyncLogRecorder::new(self.store.clone(), clock.clone());
        self.clock = clock;
        self
    }

    /// Replace the config
    ///
    /// Not validated here: an unusable value fails each sync that needs it.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// The audit log this orchestrator writes to
    pub fn recorder(&self) -> &SyncLogRecorder {
        &self.recorder
    }

    /// Sync a single channel
    ///
    /// Never returns an error: every failure is recorded on the run (when
    /// one was opened) and reported as an unsuccessful outcome.
    pub fn sync_channel(&self, channel_id: ChannelId) -> SyncOutcome {
        let lock = self.locks.lock_for(channel_id);
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.sync_locked(channel_id)
        };
        self.locks.release(channel_id, lock);
        outcome
    }

    fn sync_locked(&self, channel_id: ChannelId) -> SyncOutcome {
        let started_at = self.clock.now();
        let mut run = None;

        match self.attempt(channel_id, started_at, &mut run) {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                if let Some(run) = run.as_mut()
                    && let Err(log_err) = self.recorder.fail(run, &message)
                {
                    error!(
                        "Failed to record sync failure: channel={} run={} error={}",
                        channel_id, run.id, log_err
                    );
                }

                error!("Sync failed: channel={} error={}", channel_id, message);

                SyncOutcome::failed(
                    channel_id,
                    e.sync_method(),
                    message,
                    elapsed_seconds(started_at, self.clock.now()),
                )
            }
        }
    }

    fn attempt(
        &self,
        channel_id: ChannelId,
        started_at: DateTime<Utc>,
        run: &mut Option<SyncRun>,
    ) -> Result<SyncOutcome> {
        let mut channel = self
            .store
            .get_channel(channel_id)?
            .ok_or(SyncError::NotFound { channel_id })?;

        let adapter = self
            .adapters
            .resolve(&channel)
            .ok_or_else(|| SyncError::AdapterMissing {
                external_id: channel.external_id.clone(),
            })?;

        let run = run.insert(self.recorder.start(channel.id)?);
        let ctx = self.context();

        let selector = StrategySelector::new(self.config.history_max_age()?);
        let method = selector.select(&channel, self.clock.now());
        debug!("[SYNC] Channel {} using {} strategy", channel.id, method);

        match method {
            SyncMethod::History => {
                sync_via_history(&ctx, &mut channel, adapter.as_ref(), run, started_at)
            }
            SyncMethod::Timestamp => {
                sync_via_timestamp(&ctx, &mut channel, adapter.as_ref(), run, started_at)
            }
        }
    }

    fn context(&self) -> StrategyContext<'_> {
        StrategyContext {
            store: self.store.as_ref(),
            gateway: self.gateway.as_ref(),
            recorder: &self.recorder,
            clock: self.clock.as_ref(),
            config: &self.config,
        }
    }

    /// Sync every active channel
    ///
    /// One channel failing does not stop the others. Only a failure to list
    /// the channels is returned as an error.
    pub fn sync_all_channels(&self) -> Result<AggregateSyncResult> {
        let channels = self.store.list_active_channels()?;
        let total = channels.len();

        let sync_one =
            |channel: &Channel| (channel.external_id.clone(), self.sync_channel(channel.id));
        let results: BTreeMap<String, SyncOutcome> = if self.config.parallel_channels {
            channels.par_iter().map(sync_one).collect()
        } else {
            channels.iter().map(sync_one).collect()
        };

        let aggregate = AggregateSyncResult::from_results(total, results);
        info!(
            "Synced {} channels: {} successful, {} failed",
            aggregate.total, aggregate.successful, aggregate.failed
        );
        Ok(aggregate)
    }

    /// Sync the requested channel, or all active channels
    pub fn sync(&self, request: SyncRequest) -> Result<SyncReport> {
        match request {
            SyncRequest::Channel(channel_id) => {
                Ok(SyncReport::Channel(self.sync_channel(channel_id)))
            }
            SyncRequest::All => self.sync_all_channels().map(SyncReport::All),
        }
    }
}
