use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use mapstate_core::api::{
    new_store, AppConfig, AppContext, KeyValueStorage, MemoryStorage, Scheduler, Services,
    TokioScheduler,
};

use crate::storage::FileStorage;
use crate::surface::HeadlessSurface;

/// File storage when `store.storage_dir` is set, in-memory otherwise.
pub fn build_storage(cfg: &AppConfig) -> Result<Arc<dyn KeyValueStorage>> {
    match cfg.store.storage_dir.as_deref() {
        Some(dir) if !dir.trim().is_empty() => {
            Ok(Arc::new(FileStorage::new(expand_home(dir))?))
        }
        _ => Ok(Arc::new(MemoryStorage::new())),
    }
}

pub fn build_scheduler(cfg: &AppConfig) -> Arc<dyn Scheduler> {
    Arc::new(TokioScheduler::new(cfg.bulk.frame_interval()))
}

pub fn build_services(cfg: &AppConfig, surface: &HeadlessSurface) -> Services {
    let surface = Arc::new(surface.clone());
    Services {
        scheduler: build_scheduler(cfg),
        materializer: surface.clone(),
        renderer: surface.clone(),
        handlers: surface,
    }
}

/// Full runtime over the headless surface. The surface is returned alongside
/// so callers can attach and detach features.
pub fn build_context(cfg: AppConfig) -> Result<(AppContext, HeadlessSurface)> {
    let storage = build_storage(&cfg)?;
    tracing::debug!(storage = storage.name(), "storage selected");
    let store = new_store(&cfg, storage);
    let surface = HeadlessSurface::new(store.clone());
    let services = build_services(&cfg, &surface);
    Ok((AppContext::new(cfg, store, services), surface))
}

fn expand_home(dir: &str) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(dir)
}
