//! History-vs-timestamp decision

use chrono::{DateTime, Duration, Utc};

use crate::models::{Channel, SyncMethod};

/// Decides whether a channel's history cursor can be trusted
///
/// Providers silently expire cursors after a retention window, so a cursor
/// older than `max_age` is treated as unusable even if present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySelector {
    max_age: Duration,
}

impl StrategySelector {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// True iff the channel has a non-empty cursor obtained less than
    /// `max_age` before `now`
    pub fn can_use_history(&self, channel: &Channel, now: DateTime<Utc>) -> bool {
        let cursor = &channel.cursor;
        match (cursor.history_cursor(), cursor.last_history_sync_at) {
            (Some(_), Some(obtained_at)) => now - obtained_at < self.max_age,
            _ => false,
        }
    }

    pub fn select(&self, channel: &Channel, now: DateTime<Utc>) -> SyncMethod {
        if self.can_use_history(channel, now) {
            SyncMethod::History
        } else {
            SyncMethod::Timestamp
        }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}
