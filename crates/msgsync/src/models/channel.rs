//! Channel model and its sync cursor state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal channel identifier (database primary key)
pub type ChannelId = i64;

/// Cursor state persisted per channel between sync runs
///
/// Only the sync strategies write this, and only once a fetch-and-persist
/// cycle has finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Provider-issued delta token, opaque to us
    pub history_cursor: Option<String>,
    /// Watermark for the timestamp strategy
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When `history_cursor` was obtained
    pub last_history_sync_at: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// The history cursor, if one is present and non-empty
    pub fn history_cursor(&self) -> Option<&str> {
        self.history_cursor.as_deref().filter(|c| !c.is_empty())
    }

    /// Replace the history cursor, stamping it with `at`
    ///
    /// An empty token is stored as no token.
    pub fn set_history_cursor(&mut self, cursor: Option<String>, at: DateTime<Utc>) {
        self.history_cursor = cursor.filter(|c| !c.is_empty());
        self.last_history_sync_at = Some(at);
    }
}

/// A configured external message source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Internal identifier (0 until assigned by the store)
    pub id: ChannelId,
    /// Provider-facing identifier, also the adapter lookup key (unique)
    pub external_id: String,
    /// Inactive channels are skipped by batch syncs
    pub is_active: bool,
    pub cursor: SyncCursor,
}

impl Channel {
    /// Create a new active channel (id will be assigned by the store)
    pub fn new(external_id: impl Into<String>) -> Self {
        Self::with_id(0, external_id)
    }

    /// Create a channel with a known ID (loaded from the store)
    pub fn with_id(id: ChannelId, external_id: impl Into<String>) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            is_active: true,
            cursor: SyncCursor::default(),
        }
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Set the timestamp watermark
    pub fn with_last_sync_at(mut self, at: DateTime<Utc>) -> Self {
        self.cursor.last_sync_at = Some(at);
        self
    }

    /// Set the history cursor together with the time it was obtained
    pub fn with_history_cursor(mut self, cursor: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.cursor.set_history_cursor(Some(cursor.into()), at);
        self
    }
}
