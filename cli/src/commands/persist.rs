//! `persist` / `restore` commands
use serde_json::{json, Value};

use crate::commands::cli::{PersistArgs, RestoreArgs};
use crate::error::CliError;
use mapstate_core::api::AppContext;

/// Parse a `PATH=JSON` assignment. A value that is not valid JSON is taken
/// as a plain string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), CliError> {
    let Some((path, value)) = raw.split_once('=') else {
        return Err(CliError::Command(format!(
            "invalid --set {raw:?}: expected PATH=JSON"
        )));
    };
    let path = path.trim();
    if path.is_empty() {
        return Err(CliError::Command(format!("invalid --set {raw:?}: empty path")));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.to_string(), value))
}

pub fn handle_persist(args: PersistArgs, ctx: &AppContext) -> Result<Value, CliError> {
    let store = ctx.store();
    for raw in &args.set {
        let (path, value) = parse_assignment(raw)?;
        store.set(&path, value)?;
    }
    warn_if_volatile(ctx);

    let paths: Vec<&str> = args.paths.iter().map(String::as_str).collect();
    let subset = (!paths.is_empty()).then_some(paths.as_slice());
    store.persist(&args.key, subset);

    Ok(json!({
        "key": args.key,
        "paths": args.paths,
        "persisted": store.capture(subset).data,
    }))
}

pub fn handle_restore(args: RestoreArgs, ctx: &AppContext) -> Result<Value, CliError> {
    warn_if_volatile(ctx);
    let store = ctx.store();
    store.restore(&args.key, !args.replace);
    Ok(json!({
        "key": args.key,
        "merge": !args.replace,
        "state": store.snapshot(),
    }))
}

fn warn_if_volatile(ctx: &AppContext) {
    if ctx.cfg().store.storage_dir.is_none() {
        tracing::warn!("no storage_dir configured; snapshots live only for this process");
    }
}
