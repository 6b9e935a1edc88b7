//! Channel adapter boundary
//!
//! Adapters talk to a provider's API and hand back raw messages. How they do
//! it is their business; the sync engine only sees [`FetchResult`]s.

mod registry;

pub use registry::{AdapterRegistry, AdapterResolver};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::models::{RawMessage, SyncMethod};

/// Connector for a single external channel
///
/// Expected failures (auth, rate limits, an expired cursor) are reported as
/// `Ok(FetchResult { success: false, .. })`. `Err` is reserved for
/// unexpected faults.
pub trait ChannelAdapter: Send + Sync {
    /// Fetch messages received since `since`
    fn receive_messages(&self, since: Option<DateTime<Utc>>) -> Result<FetchResult>;

    /// Fetch messages changed since the provider cursor `cursor`
    fn receive_messages_via_history(&self, cursor: &str) -> Result<FetchResult>;
}

/// What an adapter call returned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    /// Cursor to resume from on the next history fetch
    #[serde(alias = "historyId")]
    pub new_cursor: Option<String>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn ok(messages: Vec<RawMessage>) -> Self {
        Self {
            success: true,
            messages,
            new_cursor: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: Vec::new(),
            new_cursor: None,
            error: Some(error.into()),
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.new_cursor = Some(cursor.into());
        self
    }

    /// Split a successful result into its messages and cursor
    ///
    /// An unsuccessful result becomes `AdapterFetchFailure` attributed to
    /// `method`, carrying the adapter's error text when it gave one.
    pub fn into_batch(
        self,
        method: SyncMethod,
    ) -> Result<(Vec<RawMessage>, Option<String>), SyncError> {
        if !self.success {
            let message = self.error.unwrap_or_else(|| match method {
                SyncMethod::History => "History sync failed".to_string(),
                SyncMethod::Timestamp => "Failed to fetch messages".to_string(),
            });
            return Err(SyncError::fetch_failure(method, message));
        }
        Ok((self.messages, self.new_cursor))
    }
}
