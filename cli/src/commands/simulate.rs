//! `simulate`: one toggle-all style bulk operation against the headless surface
use serde::Serialize;
use serde_json::json;

use crate::commands::cli::SimulateArgs;
use crate::commands::sync::{settle_timeout, wait_idle};
use crate::error::CliError;
use mapstate_core::api::{AppContext, BulkFlushReport, LabelRequest, SyncStatus, SyncTrigger};
use mapstate_plugins::surface::HeadlessSurface;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateSummary {
    pub flush: BulkFlushReport,
    pub deferred_labels: usize,
    pub active_list_len: usize,
    pub active_list_renders: usize,
    pub sync: SyncStatus,
}

pub async fn handle_simulate(
    args: SimulateArgs,
    ctx: &AppContext,
    surface: &HeadlessSurface,
) -> Result<SimulateSummary, CliError> {
    if args.category.is_empty() || args.category.contains('.') {
        return Err(CliError::Command(format!(
            "invalid category {:?}: must be non-empty and contain no '.'",
            args.category
        )));
    }
    if args.stale > args.items {
        return Err(CliError::Command(format!(
            "--stale ({}) cannot exceed --items ({})",
            args.stale, args.items
        )));
    }

    let keys: Vec<String> = (0..args.items)
        .map(|i| format!("{}-{:03}", args.category, i))
        .collect();
    for key in &keys {
        surface.attach(&args.category, key);
    }

    let bulk = ctx.bulk();
    let facade = ctx.facade();
    if !bulk.begin(&args.operation, args.items) {
        return Err(CliError::Command("a bulk operation is already running".to_string()));
    }

    for key in &keys {
        facade.set_emphasised(&args.category, key, true)?;
        bulk.request_label(LabelRequest::new(args.category.as_str(), key.as_str()));
        bulk.request_active_list_refresh();
    }
    for key in keys.iter().take(args.stale) {
        surface.detach(&args.category, key);
    }
    let deferred_labels = bulk.status().map(|s| s.pending_labels).unwrap_or_default();

    let Some(flush) = bulk.end().await else {
        return Err(CliError::Command("bulk operation ended unexpectedly".to_string()));
    };

    let sync = ctx.sync();
    sync.queue_sync(
        SyncTrigger::ToggleAllChanged,
        json!({ "category": args.category, "checked": true }),
    );
    wait_idle(sync, settle_timeout(ctx)).await?;

    Ok(SimulateSummary {
        flush,
        deferred_labels,
        active_list_len: surface.active_list().len(),
        active_list_renders: surface.refresh_count(),
        sync: sync.status(),
    })
}
