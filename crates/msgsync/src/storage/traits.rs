//! Storage trait definitions

use anyhow::Result;

use crate::models::{Channel, ChannelId, PersistStats, RawMessage, SyncCursor, SyncRun, SyncRunId};

/// Channel and sync-run storage
pub trait SyncStore: Send + Sync {
    /// Get a channel by internal id
    fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>>;

    /// List channels with `is_active` set, ordered by id
    fn list_active_channels(&self) -> Result<Vec<Channel>>;

    /// Insert a channel, returning its assigned id
    ///
    /// Fails if another channel already uses the same external id.
    fn insert_channel(&self, channel: Channel) -> Result<ChannelId>;

    /// Overwrite a channel's cursor state
    fn update_cursor(&self, channel_id: ChannelId, cursor: &SyncCursor) -> Result<()>;

    /// Insert a new sync run, returning its assigned id
    fn insert_run(&self, run: &SyncRun) -> Result<SyncRunId>;

    /// Overwrite an existing sync run
    fn update_run(&self, run: &SyncRun) -> Result<()>;

    /// Get a sync run by id
    fn get_run(&self, id: SyncRunId) -> Result<Option<SyncRun>>;

    /// The completed run with the latest `started_at` for a channel
    fn latest_completed_run(&self, channel_id: ChannelId) -> Result<Option<SyncRun>>;

    /// Runs for a channel, newest first
    fn list_runs(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<SyncRun>>;
}

/// Destination for fetched messages
///
/// Must be idempotent per `(channel, message external id)`: adapters deliver
/// at least once, so the same message can show up in several runs.
pub trait PersistenceGateway: Send + Sync {
    fn bulk_persist(&self, messages: &[RawMessage], channel: &Channel) -> Result<PersistStats>;
}
