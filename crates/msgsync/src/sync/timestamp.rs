//! Watermark-based sync, the path that is always available

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info};

use super::StrategyContext;
use crate::adapter::ChannelAdapter;
use crate::error::Result;
use crate::models::{Channel, SyncMethod, SyncOutcome, SyncRun, SyncSummary, elapsed_seconds};

/// Fetch everything since the channel's watermark
///
/// This is the last resort: a fetch failure here is returned as an error,
/// never retried or degraded further.
pub(crate) fn sync_via_timestamp(
    ctx: &StrategyContext<'_>,
    channel: &mut Channel,
    adapter: &dyn ChannelAdapter,
    run: &mut SyncRun,
    started_at: DateTime<Utc>,
) -> Result<SyncOutcome> {
    // The window opens before the fetch so messages arriving mid-call are
    // picked up next time
    let sync_start = ctx.clock.now();
    let since = effective_watermark(ctx, channel, sync_start)?;
    debug!("[SYNC] Timestamp fetch for channel {} since {}", channel.id, since);

    let (messages, new_cursor) = adapter
        .receive_messages(Some(since))?
        .into_batch(SyncMethod::Timestamp)?;

    let stats = ctx.gateway.bulk_persist(&messages, channel)?;

    let mut cursor = channel.cursor.clone();
    cursor.last_sync_at = Some(sync_start);
    // Opportunistic cursor lets the channel switch to history next time
    if let Some(token) = new_cursor.filter(|t| !t.is_empty()) {
        cursor.set_history_cursor(Some(token), ctx.clock.now());
    }
    ctx.store.update_cursor(channel.id, &cursor)?;
    channel.cursor = cursor;

    let duration_seconds = elapsed_seconds(started_at, ctx.clock.now());
    ctx.recorder.complete(
        run,
        messages.len(),
        stats,
        SyncSummary {
            duration_seconds,
            sync_method: SyncMethod::Timestamp,
        },
    )?;

    let outcome = SyncOutcome::completed(
        channel.id,
        SyncMethod::Timestamp,
        messages.len(),
        stats,
        duration_seconds,
    );
    info!(
        "Timestamp sync completed: channel={} fetched={} processed={} failed={} duration={}s",
        channel.id,
        outcome.messages_fetched,
        outcome.messages_processed,
        outcome.messages_failed,
        outcome.duration_seconds
    );
    Ok(outcome)
}

/// Where the timestamp fetch starts
///
/// The channel's own watermark, else the start of its latest completed run,
/// else the configured lookback before `now`.
fn effective_watermark(
    ctx: &StrategyContext<'_>,
    channel: &Channel,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if let Some(last_sync_at) = channel.cursor.last_sync_at {
        return Ok(last_sync_at);
    }

    if let Some(run) = ctx.store.latest_completed_run(channel.id)? {
        return Ok(run.started_at);
    }

    let lookback = ctx.config.default_lookback()?;
    let since = now
        .checked_sub_signed(lookback)
        .context("Default lookback reaches before the earliest representable time")?;
    Ok(since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FetchResult;
    use crate::error::SyncError;
    use crate::models::SyncRunStatus;
    use crate::storage::SyncStore;
    use crate::sync::testing::{Harness, ScriptedAdapter, message};
    use chrono::Duration;

    #[test]
    fn test_first_sync_defaults_to_lookback() {
        let harness = Harness::new();
        let mut channel = harness.channel(Channel::new("gmail"));
        let adapter = ScriptedAdapter::new().on_receive(FetchResult::ok(vec![message("m1")]));
        let mut run = harness.open_run(&channel);

        let outcome =
            sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, harness.now())
                .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.sync_method, Some(SyncMethod::Timestamp));
        assert_eq!(adapter.since_calls(), vec![Some(harness.now() - Duration::hours(24))]);
    }

    #[test]
    fn test_watermark_prefers_channel_last_sync_at() {
        let harness = Harness::new();
        let watermark = harness.now() - Duration::hours(3);
        let mut channel = harness.channel(Channel::new("gmail").with_last_sync_at(watermark));
        let adapter = ScriptedAdapter::new().on_receive(FetchResult::ok(Vec::new()));
        let mut run = harness.open_run(&channel);

        sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, harness.now())
            .unwrap();

        assert_eq!(adapter.since_calls(), vec![Some(watermark)]);
    }

    #[test]
    fn test_watermark_falls_back_to_latest_completed_run() {
        let harness = Harness::new();
        let channel = harness.channel(Channel::new("gmail"));

        let mut previous = SyncRun::start(channel.id, harness.now() - Duration::hours(5));
        previous.status = SyncRunStatus::Completed;
        harness.store.insert_run(&previous).unwrap();

        let ctx = harness.ctx();
        let since = effective_watermark(&ctx, &channel, harness.now()).unwrap();
        assert_eq!(since, harness.now() - Duration::hours(5));
    }

    #[test]
    fn test_watermark_is_captured_before_fetch() {
        let harness = Harness::new();
        let mut channel = harness.channel(Channel::new("gmail"));
        let adapter = ScriptedAdapter::new()
            .on_receive(FetchResult::ok(vec![message("m1")]))
            .taking(harness.clock.clone(), Duration::seconds(40));
        let mut run = harness.open_run(&channel);
        let sync_start = harness.now();

        sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, sync_start).unwrap();

        let stored = harness.store.get_channel(channel.id).unwrap().unwrap();
        assert_eq!(stored.cursor.last_sync_at, Some(sync_start));
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.summary.map(|s| s.duration_seconds), Some(40.0));
    }

    #[test]
    fn test_returned_cursor_bootstraps_history() {
        let harness = Harness::new();
        let mut channel = harness.channel(Channel::new("gmail"));
        let adapter = ScriptedAdapter::new()
            .on_receive(FetchResult::ok(Vec::new()).with_cursor("h7"))
            .taking(harness.clock.clone(), Duration::seconds(2));
        let mut run = harness.open_run(&channel);
        let sync_start = harness.now();

        sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, sync_start).unwrap();

        let stored = harness.store.get_channel(channel.id).unwrap().unwrap();
        assert_eq!(stored.cursor.history_cursor(), Some("h7"));
        assert_eq!(stored.cursor.last_sync_at, Some(sync_start));
        // Stamped after the fetch, unlike the watermark
        assert_eq!(
            stored.cursor.last_history_sync_at,
            Some(sync_start + Duration::seconds(2))
        );
    }

    #[test]
    fn test_missing_cursor_keeps_existing_one() {
        let harness = Harness::new();
        let obtained = harness.now() - Duration::days(10);
        let mut channel =
            harness.channel(Channel::new("gmail").with_history_cursor("old", obtained));
        let adapter = ScriptedAdapter::new().on_receive(FetchResult::ok(Vec::new()));
        let mut run = harness.open_run(&channel);

        sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, harness.now())
            .unwrap();

        assert_eq!(channel.cursor.history_cursor(), Some("old"));
        assert_eq!(channel.cursor.last_history_sync_at, Some(obtained));
    }

    #[test]
    fn test_fetch_failure_is_fatal() {
        let harness = Harness::new();
        let mut channel = harness.channel(Channel::new("gmail"));
        let adapter = ScriptedAdapter::new().on_receive(FetchResult::failure("quota exceeded"));
        let mut run = harness.open_run(&channel);

        let err =
            sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, harness.now())
                .unwrap_err();

        assert!(matches!(
            err,
            SyncError::AdapterFetchFailure {
                method: SyncMethod::Timestamp,
                ..
            }
        ));
        // Finalizing is the orchestrator's job
        assert_eq!(run.status, SyncRunStatus::Running);
        let stored = harness.store.get_channel(channel.id).unwrap().unwrap();
        assert!(stored.cursor.last_sync_at.is_none());
    }

    #[test]
    fn test_partial_persistence_still_completes() {
        let harness = Harness::new();
        let mut channel = harness.channel(Channel::new("gmail"));
        let adapter =
            ScriptedAdapter::new().on_receive(FetchResult::ok(vec![message("m1"), message("")]));
        let mut run = harness.open_run(&channel);

        let outcome =
            sync_via_timestamp(&harness.ctx(), &mut channel, &adapter, &mut run, harness.now())
                .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.messages_fetched, 2);
        assert_eq!(outcome.messages_processed, 1);
        assert_eq!(outcome.messages_failed, 1);
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.messages_failed, 1);
    }
}
