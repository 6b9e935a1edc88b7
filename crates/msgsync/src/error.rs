//! Error taxonomy for sync operations

use crate::models::{ChannelId, SyncMethod, SyncRunId, SyncRunStatus};

/// Crate-wide result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Typed failures of a sync attempt.
///
/// Per-message persistence failures are not represented here; they are
/// counted in [`crate::models::PersistStats`] and the run still completes.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The requested channel id does not exist.
    #[error("Channel not found: {channel_id}")]
    NotFound { channel_id: ChannelId },

    /// No adapter is registered for the channel.
    #[error("Adapter not found: {external_id}")]
    AdapterMissing { external_id: String },

    /// The adapter reported failure instead of messages.
    #[error("{method} fetch failed: {message}")]
    AdapterFetchFailure { method: SyncMethod, message: String },

    /// A terminal sync run was asked to transition again.
    #[error("Sync run {run_id} is already {status}")]
    RunFinalized {
        run_id: SyncRunId,
        status: SyncRunStatus,
    },

    /// Anything else escaping a sync attempt (store, gateway, adapter faults).
    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

impl SyncError {
    #[must_use]
    pub fn fetch_failure(method: SyncMethod, message: impl Into<String>) -> Self {
        Self::AdapterFetchFailure {
            method,
            message: message.into(),
        }
    }

    /// The strategy the error is attributable to, if any
    pub fn sync_method(&self) -> Option<SyncMethod> {
        match self {
            Self::AdapterFetchFailure { method, .. } => Some(*method),
            _ => None,
        }
    }
}
