//! In-memory storage implementation
//!
//! Used for tests and for hosts that do not need durable sync state.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{PersistenceGateway, SyncStore};
use crate::models::{
    Channel, ChannelId, PersistStats, RawMessage, SyncCursor, SyncRun, SyncRunId, SyncRunStatus,
};

/// In-memory implementation of SyncStore and PersistenceGateway
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemorySyncStore {
    channels: RwLock<HashMap<ChannelId, Channel>>,
    runs: RwLock<HashMap<SyncRunId, SyncRun>>,
    /// Persisted messages keyed by (channel id, message external id)
    messages: RwLock<HashMap<(ChannelId, String), RawMessage>>,
}

impl InMemorySyncStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
        }
    }

    /// Number of distinct messages stored for a channel
    pub fn message_count(&self, channel_id: ChannelId) -> usize {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        messages.keys().filter(|(id, _)| *id == channel_id).count()
    }

    /// Get a stored message
    pub fn get_message(&self, channel_id: ChannelId, external_id: &str) -> Option<RawMessage> {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        messages.get(&(channel_id, external_id.to_string())).cloned()
    }
}

impl Default for InMemorySyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStore for InMemorySyncStore {
    fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        Ok(channels.get(&id).cloned())
    }

    fn list_active_channels(&self) -> Result<Vec<Channel>> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<Channel> = channels.values().filter(|c| c.is_active).cloned().collect();
        active.sort_by_key(|c| c.id);
        Ok(active)
    }

    fn insert_channel(&self, mut channel: Channel) -> Result<ChannelId> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);

        if channels.values().any(|c| c.external_id == channel.external_id) {
            bail!("Channel external id already exists: {}", channel.external_id);
        }

        if channel.id == 0 {
            channel.id = channels.keys().max().copied().unwrap_or(0) + 1;
        } else if channels.contains_key(&channel.id) {
            bail!("Channel id already exists: {}", channel.id);
        }

        let id = channel.id;
        channels.insert(id, channel);
        Ok(id)
    }

    fn update_cursor(&self, channel_id: ChannelId, cursor: &SyncCursor) -> Result<()> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = channels.get_mut(&channel_id) else {
            bail!("Channel not found: {channel_id}");
        };
        channel.cursor = cursor.clone();
        Ok(())
    }

    fn insert_run(&self, run: &SyncRun) -> Result<SyncRunId> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let id = runs.keys().max().copied().unwrap_or(0) + 1;
        let mut run = run.clone();
        run.id = id;
        runs.insert(id, run);
        Ok(id)
    }

    fn update_run(&self, run: &SyncRun) -> Result<()> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = runs.get_mut(&run.id) else {
            bail!("Sync run not found: {}", run.id);
        };
        *stored = run.clone();
        Ok(())
    }

    fn get_run(&self, id: SyncRunId) -> Result<Option<SyncRun>> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(runs.get(&id).cloned())
    }

    fn latest_completed_run(&self, channel_id: ChannelId) -> Result<Option<SyncRun>> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(runs
            .values()
            .filter(|r| r.channel_id == channel_id && r.status == SyncRunStatus::Completed)
            .max_by_key(|r| (r.started_at, r.id))
            .cloned())
    }

    fn list_runs(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<SyncRun>> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<SyncRun> = runs
            .values()
            .filter(|r| r.channel_id == channel_id)
            .cloned()
            .collect();

        // Newest first
        list.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        list.truncate(limit);
        Ok(list)
    }
}

impl PersistenceGateway for InMemorySyncStore {
    fn bulk_persist(&self, messages: &[RawMessage], channel: &Channel) -> Result<PersistStats> {
        let mut stored = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        let mut stats = PersistStats::default();

        for message in messages {
            // Without an identity the message cannot be deduplicated
            if message.external_id.is_empty() {
                stats.failed += 1;
                continue;
            }
            // Redelivery keeps the first stored copy
            stored
                .entry((channel.id, message.external_id.clone()))
                .or_insert_with(|| message.clone());
            stats.succeeded += 1;
        }

        Ok(stats)
    }
}
