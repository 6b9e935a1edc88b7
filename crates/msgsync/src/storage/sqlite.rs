//! SQLite-based storage for channels, sync runs and messages

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::{PersistenceGateway, SyncStore};
use crate::clock::{Clock, SystemClock};
use crate::models::{
    Channel, ChannelId, PersistStats, RawMessage, SyncCursor, SyncRun, SyncRunId, SyncSummary,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                history_cursor TEXT,
                last_sync_at TEXT,
                last_history_sync_at TEXT
            );

            -- One row per sync attempt, append-then-finalize
            CREATE TABLE sync_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                messages_fetched INTEGER NOT NULL DEFAULT 0,
                messages_processed INTEGER NOT NULL DEFAULT 0,
                messages_failed INTEGER NOT NULL DEFAULT 0,
                summary TEXT,  -- JSON
                errors TEXT,
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_sync_runs_channel_status
                ON sync_runs(channel_id, status, started_at DESC);

            -- Persisted messages, deduplicated per channel
            CREATE TABLE messages (
                channel_id INTEGER NOT NULL,
                external_id TEXT NOT NULL,
                payload TEXT NOT NULL,  -- JSON
                stored_at TEXT NOT NULL,
                PRIMARY KEY (channel_id, external_id),
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            );
            "#,
        ),
    ])
}

/// Timestamps are stored as fixed-width UTC RFC 3339 so text order is time order
fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {value}"))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

/// Raw channel row before timestamp parsing
struct ChannelRow {
    id: ChannelId,
    external_id: String,
    is_active: bool,
    history_cursor: Option<String>,
    last_sync_at: Option<String>,
    last_history_sync_at: Option<String>,
}

impl ChannelRow {
    const COLUMNS: &'static str =
        "id, external_id, is_active, history_cursor, last_sync_at, last_history_sync_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            external_id: row.get(1)?,
            is_active: row.get(2)?,
            history_cursor: row.get(3)?,
            last_sync_at: row.get(4)?,
            last_history_sync_at: row.get(5)?,
        })
    }

    fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: self.id,
            external_id: self.external_id,
            is_active: self.is_active,
            cursor: SyncCursor {
                history_cursor: self.history_cursor,
                last_sync_at: parse_opt_ts(self.last_sync_at)?,
                last_history_sync_at: parse_opt_ts(self.last_history_sync_at)?,
            },
        })
    }
}

/// Raw sync run row before status/timestamp/summary parsing
struct RunRow {
    id: SyncRunId,
    channel_id: ChannelId,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    messages_fetched: i64,
    messages_processed: i64,
    messages_failed: i64,
    summary: Option<String>,
    errors: Option<String>,
}

impl RunRow {
    const COLUMNS: &'static str = "id, channel_id, status, started_at, completed_at, \
         messages_fetched, messages_processed, messages_failed, summary, errors";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            messages_fetched: row.get(5)?,
            messages_processed: row.get(6)?,
            messages_failed: row.get(7)?,
            summary: row.get(8)?,
            errors: row.get(9)?,
        })
    }

    fn into_run(self) -> Result<SyncRun> {
        let summary: Option<SyncSummary> = self
            .summary
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("Invalid sync run summary in database")?;

        Ok(SyncRun {
            id: self.id,
            channel_id: self.channel_id,
            status: self.status.parse()?,
            started_at: parse_ts(&self.started_at)?,
            completed_at: parse_opt_ts(self.completed_at)?,
            messages_fetched: self.messages_fetched as usize,
            messages_processed: self.messages_processed as usize,
            messages_failed: self.messages_failed as usize,
            summary,
            errors: self.errors,
        })
    }
}

/// SQLite-based sync storage
///
/// One connection behind a mutex; the sync engine's own per-channel locking
/// keeps contention low.
pub struct SqliteSyncStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteSyncStore {
    /// Open (or create) a database file and bring its schema up to date
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers (status queries) proceed while a sync writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp stored messages from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of distinct messages stored for a channel
    pub fn message_count(&self, channel_id: ChannelId) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_id = ?",
            [channel_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn query_runs(&self, sql: &str, channel_id: ChannelId, limit: usize) -> Result<Vec<SyncRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![channel_id, limit as i64], RunRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RunRow::into_run).collect()
    }
}

impl SyncStore for SqliteSyncStore {
    fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM channels WHERE id = ?", ChannelRow::COLUMNS),
                [id],
                ChannelRow::from_row,
            )
            .optional()?;
        row.map(ChannelRow::into_channel).transpose()
    }

    fn list_active_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM channels WHERE is_active = 1 ORDER BY id",
            ChannelRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map([], ChannelRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ChannelRow::into_channel).collect()
    }

    fn insert_channel(&self, channel: Channel) -> Result<ChannelId> {
        let conn = self.conn();
        let id = (channel.id != 0).then_some(channel.id);

        conn.execute(
            "INSERT INTO channels
             (id, external_id, is_active, history_cursor, last_sync_at, last_history_sync_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id,
                channel.external_id,
                channel.is_active,
                channel.cursor.history_cursor,
                channel.cursor.last_sync_at.map(format_ts),
                channel.cursor.last_history_sync_at.map(format_ts),
            ],
        )
        .with_context(|| format!("Failed to insert channel {}", channel.external_id))?;

        Ok(conn.last_insert_rowid())
    }

    fn update_cursor(&self, channel_id: ChannelId, cursor: &SyncCursor) -> Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE channels
             SET history_cursor = ?, last_sync_at = ?, last_history_sync_at = ?
             WHERE id = ?",
            params![
                cursor.history_cursor,
                cursor.last_sync_at.map(format_ts),
                cursor.last_history_sync_at.map(format_ts),
                channel_id,
            ],
        )?;

        if updated == 0 {
            anyhow::bail!("Channel not found: {channel_id}");
        }
        Ok(())
    }

    fn insert_run(&self, run: &SyncRun) -> Result<SyncRunId> {
        let conn = self.conn();
        let summary = run.summary.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO sync_runs
             (channel_id, status, started_at, completed_at, messages_fetched,
              messages_processed, messages_failed, summary, errors)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                run.channel_id,
                run.status.as_str(),
                format_ts(run.started_at),
                run.completed_at.map(format_ts),
                run.messages_fetched as i64,
                run.messages_processed as i64,
                run.messages_failed as i64,
                summary,
                run.errors,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn update_run(&self, run: &SyncRun) -> Result<()> {
        let conn = self.conn();
        let summary = run.summary.as_ref().map(serde_json::to_string).transpose()?;

        let updated = conn.execute(
            "UPDATE sync_runs
             SET status = ?, completed_at = ?, messages_fetched = ?,
                 messages_processed = ?, messages_failed = ?, summary = ?, errors = ?
             WHERE id = ?",
            params![
                run.status.as_str(),
                run.completed_at.map(format_ts),
                run.messages_fetched as i64,
                run.messages_processed as i64,
                run.messages_failed as i64,
                summary,
                run.errors,
                run.id,
            ],
        )?;

        if updated == 0 {
            anyhow::bail!("Sync run not found: {}", run.id);
        }
        Ok(())
    }

    fn get_run(&self, id: SyncRunId) -> Result<Option<SyncRun>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sync_runs WHERE id = ?", RunRow::COLUMNS),
                [id],
                RunRow::from_row,
            )
            .optional()?;
        row.map(RunRow::into_run).transpose()
    }

    fn latest_completed_run(&self, channel_id: ChannelId) -> Result<Option<SyncRun>> {
        let sql = format!(
            "SELECT {} FROM sync_runs
             WHERE channel_id = ? AND status = 'completed'
             ORDER BY started_at DESC, id DESC
             LIMIT ?",
            RunRow::COLUMNS
        );
        Ok(self.query_runs(&sql, channel_id, 1)?.into_iter().next())
    }

    fn list_runs(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<SyncRun>> {
        let sql = format!(
            "SELECT {} FROM sync_runs
             WHERE channel_id = ?
             ORDER BY started_at DESC, id DESC
             LIMIT ?",
            RunRow::COLUMNS
        );
        self.query_runs(&sql, channel_id, limit)
    }
}

impl PersistenceGateway for SqliteSyncStore {
    fn bulk_persist(&self, messages: &[RawMessage], channel: &Channel) -> Result<PersistStats> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut stats = PersistStats::default();
        let stored_at = format_ts(self.clock.now());

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO messages (channel_id, external_id, payload, stored_at)
                 VALUES (?, ?, ?, ?)",
            )?;

            for message in messages {
                if message.external_id.is_empty() {
                    stats.failed += 1;
                    continue;
                }

                let result = serde_json::to_string(&message.payload)
                    .map_err(anyhow::Error::from)
                    .and_then(|payload| {
                        stmt.execute(params![channel.id, message.external_id, payload, stored_at])
                            .map_err(anyhow::Error::from)
                    });

                match result {
                    Ok(_) => stats.succeeded += 1,
                    Err(e) => {
                        log::warn!(
                            "Failed to persist message {} for channel {}: {}",
                            message.external_id,
                            channel.id,
                            e
                        );
                        stats.failed += 1;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SyncMethod, SyncRunStatus};
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteSyncStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("msgsync.test.sqlite");
        let store = SqliteSyncStore::new(&db_path).unwrap();
        (store, dir)
    }

    #[test]
    fn test_channel_crud() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();

        let id = store
            .insert_channel(Channel::new("gmail").with_history_cursor("h1", now))
            .unwrap();
        let channel = store.get_channel(id).unwrap().unwrap();

        assert_eq!(channel.external_id, "gmail");
        assert_eq!(channel.cursor.history_cursor(), Some("h1"));
        // Stored at microsecond precision
        let stored_at = channel.cursor.last_history_sync_at.unwrap();
        assert!((stored_at - now).num_milliseconds().abs() < 1);
        assert!(store.get_channel(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_external_id_rejected() {
        let (store, _dir) = create_test_store();
        store.insert_channel(Channel::new("gmail")).unwrap();
        assert!(store.insert_channel(Channel::new("gmail")).is_err());
    }

    #[test]
    fn test_list_active_channels() {
        let (store, _dir) = create_test_store();
        store.insert_channel(Channel::new("a")).unwrap();
        store
            .insert_channel(Channel::new("b").with_active(false))
            .unwrap();
        store.insert_channel(Channel::new("c")).unwrap();

        let active: Vec<String> = store
            .list_active_channels()
            .unwrap()
            .into_iter()
            .map(|c| c.external_id)
            .collect();
        assert_eq!(active, vec!["a", "c"]);
    }

    #[test]
    fn test_update_cursor() {
        let (store, _dir) = create_test_store();
        let id = store.insert_channel(Channel::new("gmail")).unwrap();
        let now = Utc::now();

        let cursor = SyncCursor {
            history_cursor: Some("h2".to_string()),
            last_sync_at: Some(now),
            last_history_sync_at: Some(now),
        };
        store.update_cursor(id, &cursor).unwrap();

        let channel = store.get_channel(id).unwrap().unwrap();
        assert_eq!(channel.cursor.history_cursor(), Some("h2"));
        assert!(channel.cursor.last_sync_at.is_some());
        assert!(store.update_cursor(id + 1, &cursor).is_err());
    }

    #[test]
    fn test_run_lifecycle() {
        let (store, _dir) = create_test_store();
        let channel_id = store.insert_channel(Channel::new("gmail")).unwrap();
        let now = Utc::now();

        let mut run = SyncRun::start(channel_id, now);
        run.id = store.insert_run(&run).unwrap();
        run.complete(
            3,
            PersistStats {
                succeeded: 2,
                failed: 1,
            },
            SyncSummary {
                duration_seconds: 0.42,
                sync_method: SyncMethod::Timestamp,
            },
            now,
        )
        .unwrap();
        store.update_run(&run).unwrap();

        let loaded = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(loaded.status, SyncRunStatus::Completed);
        assert_eq!(loaded.messages_fetched, 3);
        assert_eq!(loaded.messages_processed, 2);
        assert_eq!(loaded.messages_failed, 1);
        assert_eq!(
            loaded.summary.map(|s| s.sync_method),
            Some(SyncMethod::Timestamp)
        );
    }

    #[test]
    fn test_latest_completed_run() {
        let (store, _dir) = create_test_store();
        let channel_id = store.insert_channel(Channel::new("gmail")).unwrap();
        let now = Utc::now();

        let mut older = SyncRun::start(channel_id, now - Duration::hours(3));
        older.status = SyncRunStatus::Completed;
        let mut newer = SyncRun::start(channel_id, now - Duration::hours(1));
        newer.status = SyncRunStatus::Completed;
        let mut failed = SyncRun::start(channel_id, now);
        failed.status = SyncRunStatus::Failed;

        store.insert_run(&newer).unwrap();
        store.insert_run(&older).unwrap();
        store.insert_run(&failed).unwrap();

        let latest = store.latest_completed_run(channel_id).unwrap().unwrap();
        assert_eq!(format_ts(latest.started_at), format_ts(newer.started_at));
        assert_eq!(store.list_runs(channel_id, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_bulk_persist_is_idempotent() {
        let (store, _dir) = create_test_store();
        let channel_id = store.insert_channel(Channel::new("gmail")).unwrap();
        let channel = store.get_channel(channel_id).unwrap().unwrap();
        let messages = vec![
            RawMessage::new("m1", json!({"subject": "one"})),
            RawMessage::new("m2", json!({"subject": "two"})),
            RawMessage::new("", json!({})),
        ];

        let first = store.bulk_persist(&messages, &channel).unwrap();
        let second = store.bulk_persist(&messages, &channel).unwrap();

        assert_eq!(first, PersistStats { succeeded: 2, failed: 1 });
        assert_eq!(second, first);
        assert_eq!(store.message_count(channel_id).unwrap(), 2);
    }

    #[test]
    fn test_bulk_persist_stamps_from_clock() {
        let stamped = Utc::now() - Duration::days(3);
        let store = SqliteSyncStore::open_in_memory()
            .unwrap()
            .with_clock(Arc::new(crate::clock::ManualClock::new(stamped)));
        let channel_id = store.insert_channel(Channel::new("gmail")).unwrap();
        let channel = store.get_channel(channel_id).unwrap().unwrap();

        store
            .bulk_persist(&[RawMessage::new("m1", json!({}))], &channel)
            .unwrap();

        let stored_at: String = store
            .conn()
            .query_row(
                "SELECT stored_at FROM messages WHERE external_id = 'm1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored_at, format_ts(stamped));
    }

    #[test]
    fn test_in_memory_database() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let id = store.insert_channel(Channel::new("gmail")).unwrap();
        assert!(store.get_channel(id).unwrap().is_some());
    }
}
