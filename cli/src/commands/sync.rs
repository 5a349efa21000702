//! Sync CLI command implementation
use std::time::Duration;

use serde_json::json;

use crate::commands::cli::SyncArgs;
use crate::error::CliError;
use mapstate_core::api::{AppContext, SyncQueueProcessor, SyncStatus, SyncTrigger};

const POLL: Duration = Duration::from_millis(10);

pub async fn handle_sync(args: SyncArgs, ctx: &AppContext) -> Result<SyncStatus, CliError> {
    if args.count == 0 {
        return Err(CliError::Command("--count must be at least 1".to_string()));
    }
    let sync = ctx.sync();
    let trigger = SyncTrigger::from(args.trigger);
    let payload = json!({ "category": args.category, "checked": args.checked });

    for _ in 0..args.count {
        sync.queue_sync(trigger, payload.clone());
    }
    wait_idle(sync, settle_timeout(ctx)).await?;

    if args.force {
        sync.force_sync().await?;
    }
    Ok(sync.status())
}

/// Upper bound for a queue to drain: the debounce window plus every retry.
pub fn settle_timeout(ctx: &AppContext) -> Duration {
    let cfg = &ctx.cfg().sync;
    cfg.debounce() + cfg.retry_delay() * cfg.max_attempts + Duration::from_secs(5)
}

/// Wait until nothing is queued, armed or running.
pub async fn wait_idle(sync: &SyncQueueProcessor, timeout: Duration) -> Result<(), CliError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = sync.status();
        if status.queue_length == 0 && !status.is_processing && !status.timer_armed {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CliError::Command(format!(
                "sync queue did not settle within {} ms ({} queued)",
                timeout.as_millis(),
                status.queue_length
            )));
        }
        tokio::time::sleep(POLL).await;
    }
}
