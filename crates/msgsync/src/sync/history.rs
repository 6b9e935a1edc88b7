//! Cursor-based delta sync

use chrono::{DateTime, Utc};
use log::{info, warn};

use super::StrategyContext;
use super::timestamp::sync_via_timestamp;
use crate::adapter::ChannelAdapter;
use crate::error::{Result, SyncError};
use crate::models::{Channel, SyncMethod, SyncOutcome, SyncRun, SyncSummary, elapsed_seconds};

/// Fetch changes since the channel's history cursor
///
/// Any failure on this path is absorbed: the same run is handed to the
/// timestamp strategy instead, so callers only ever see a history outcome
/// when the cursor actually worked.
pub(crate) fn sync_via_history(
    ctx: &StrategyContext<'_>,
    channel: &mut Channel,
    adapter: &dyn ChannelAdapter,
    run: &mut SyncRun,
    started_at: DateTime<Utc>,
) -> Result<SyncOutcome> {
    match fetch_via_history(ctx, channel, adapter, run, started_at) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            warn!(
                "History sync failed, falling back to timestamp: channel={} error={}",
                channel.id, e
            );
            sync_via_timestamp(ctx, channel, adapter, run, started_at)
        }
    }
}

fn fetch_via_history(
    ctx: &StrategyContext<'_>,
    channel: &mut Channel,
    adapter: &dyn ChannelAdapter,
    run: &mut SyncRun,
    started_at: DateTime<Utc>,
) -> Result<SyncOutcome> {
    let Some(token) = channel.cursor.history_cursor() else {
        return Err(SyncError::fetch_failure(
            SyncMethod::History,
            "Channel has no history cursor",
        ));
    };

    // Stamped before the fetch; see sync_via_timestamp
    let sync_start = ctx.clock.now();

    let (messages, new_cursor) = adapter
        .receive_messages_via_history(token)?
        .into_batch(SyncMethod::History)?;

    let stats = ctx.gateway.bulk_persist(&messages, channel)?;

    let mut cursor = channel.cursor.clone();
    cursor.last_sync_at = Some(sync_start);
    cursor.set_history_cursor(new_cursor, sync_start);
    ctx.store.update_cursor(channel.id, &cursor)?;
    channel.cursor = cursor;

    let duration_seconds = elapsed_seconds(started_at, ctx.clock.now());
    ctx.recorder.complete(
        run,
        messages.len(),
        stats,
        SyncSummary {
            duration_seconds,
            sync_method: SyncMethod::History,
        },
    )?;

    let outcome = SyncOutcome::completed(
        channel.id,
        SyncMethod::History,
        messages.len(),
        stats,
        duration_seconds,
    );
    info!(
        "History sync completed: channel={} fetched={} processed={} failed={} duration={}s",
        channel.id,
        outcome.messages_fetched,
        outcome.messages_processed,
        outcome.messages_failed,
        outcome.duration_seconds
    );
    Ok(outcome)
}
