//! Audit record for one sync attempt
//!
//! A run is created `Running` and receives exactly one terminal transition.
//! The transitions here are pure; `SyncLogRecorder` persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ChannelId, PersistStats, SyncMethod};
use crate::error::SyncError;

/// Sync run identifier (database primary key)
pub type SyncRunId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Running,
    Completed,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncRunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unknown sync run status: {other}"),
        }
    }
}

/// Summary attached to a completed run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub duration_seconds: f64,
    pub sync_method: SyncMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    /// 0 until assigned by the store
    pub id: SyncRunId,
    pub channel_id: ChannelId,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub messages_fetched: usize,
    pub messages_processed: usize,
    pub messages_failed: usize,
    pub summary: Option<SyncSummary>,
    pub errors: Option<String>,
}

impl SyncRun {
    /// Open a new run for a channel
    pub fn start(channel_id: ChannelId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            channel_id,
            status: SyncRunStatus::Running,
            started_at,
            completed_at: None,
            messages_fetched: 0,
            messages_processed: 0,
            messages_failed: 0,
            summary: None,
            errors: None,
        }
    }

    /// `running -> completed`, recording counts and summary
    pub fn complete(
        &mut self,
        messages_fetched: usize,
        stats: PersistStats,
        summary: SyncSummary,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.ensure_running()?;
        self.status = SyncRunStatus::Completed;
        self.completed_at = Some(at);
        self.messages_fetched = messages_fetched;
        self.messages_processed = stats.succeeded;
        self.messages_failed = stats.failed;
        self.summary = Some(summary);
        Ok(())
    }

    /// `running -> failed`
    ///
    /// Counts are left untouched: after a hard failure they are not
    /// trustworthy and must not read as partial success.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.ensure_running()?;
        self.status = SyncRunStatus::Failed;
        self.completed_at = Some(at);
        self.errors = Some(error.into());
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), SyncError> {
        if self.status.is_terminal() {
            return Err(SyncError::RunFinalized {
                run_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }
}
