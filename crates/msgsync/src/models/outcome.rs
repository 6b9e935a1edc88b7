//! Results returned to callers of the sync engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{ChannelId, PersistStats};

/// Which fetch strategy served a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    /// Delta fetch from a provider cursor
    History,
    /// Fetch everything since a watermark
    Timestamp,
}

impl SyncMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of syncing a single channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub channel_id: ChannelId,
    /// None when the run failed before a strategy could be attributed
    pub sync_method: Option<SyncMethod>,
    pub messages_fetched: usize,
    pub messages_processed: usize,
    pub messages_failed: usize,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn completed(
        channel_id: ChannelId,
        sync_method: SyncMethod,
        messages_fetched: usize,
        stats: PersistStats,
        duration_seconds: f64,
    ) -> Self {
        Self {
            success: true,
            channel_id,
            sync_method: Some(sync_method),
            messages_fetched,
            messages_processed: stats.succeeded,
            messages_failed: stats.failed,
            duration_seconds,
            error: None,
        }
    }

    pub fn failed(
        channel_id: ChannelId,
        sync_method: Option<SyncMethod>,
        error: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            success: false,
            channel_id,
            sync_method,
            messages_fetched: 0,
            messages_processed: 0,
            messages_failed: 0,
            duration_seconds,
            error: Some(error.into()),
        }
    }
}

/// Result of syncing every active channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSyncResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Keyed by channel external id
    pub results: BTreeMap<String, SyncOutcome>,
}

impl AggregateSyncResult {
    /// Build the aggregate, tallying success flags across `results`
    pub fn from_results(total: usize, results: BTreeMap<String, SyncOutcome>) -> Self {
        let successful = results.values().filter(|r| r.success).count();
        let failed = results.len() - successful;
        Self {
            total,
            successful,
            failed,
            results,
        }
    }
}

/// What a caller asks the orchestrator to sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    Channel(ChannelId),
    All,
}

impl From<Option<ChannelId>> for SyncRequest {
    fn from(channel_id: Option<ChannelId>) -> Self {
        channel_id.map_or(Self::All, Self::Channel)
    }
}

/// Answer to a [`SyncRequest`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncReport {
    Channel(SyncOutcome),
    All(AggregateSyncResult),
}

/// Seconds between two instants, rounded to hundredths
pub(crate) fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0) as f64;
    (millis / 10.0).round() / 100.0
}
