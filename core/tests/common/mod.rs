#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mapstate_core::api::{
    ActiveListRenderer, AppConfig, AppContext, LabelMaterializer, LabelRequest, MemoryStorage,
    Scheduler, Services, StateStore, SyncHandlers,
};

/// Scheduler that returns immediately and counts how it was asked to yield.
#[derive(Default)]
pub struct RecordingScheduler {
    pub frames: AtomicUsize,
    pub delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn next_frame(&self) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    async fn delay(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Rendering surface that records every call in order.
#[derive(Default)]
pub struct RecordingSurface {
    pub labels: Mutex<Vec<(String, String)>>,
    pub stale: Mutex<HashSet<String>>,
    pub refreshes: AtomicUsize,
    pub sync_calls: Mutex<Vec<String>>,
}

impl RecordingSurface {
    pub fn mark_stale(&self, key: &str) {
        self.stale.lock().unwrap().insert(key.to_string());
    }

    pub fn label_keys(&self) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> Vec<String> {
        self.sync_calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.sync_calls.lock().unwrap().push(call.into());
    }
}

impl LabelMaterializer for RecordingSurface {
    fn is_live(&self, request: &LabelRequest) -> bool {
        !self.stale.lock().unwrap().contains(&request.key)
    }

    fn materialize(&self, request: &LabelRequest) -> anyhow::Result<()> {
        self.labels
            .lock()
            .unwrap()
            .push((request.category.clone(), request.key.clone()));
        Ok(())
    }
}

impl ActiveListRenderer for RecordingSurface {
    fn refresh(&self) -> anyhow::Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SyncHandlers for RecordingSurface {
    async fn sync_checkboxes(&self) -> anyhow::Result<()> {
        self.record("checkboxes");
        Ok(())
    }

    async fn sync_select_all_controls(&self) -> anyhow::Result<()> {
        self.record("selectAll");
        Ok(())
    }

    async fn sync_active_list(&self) -> anyhow::Result<()> {
        self.record("activeList");
        Ok(())
    }

    async fn sync_category_toggle(&self, category: &str, checked: bool) -> anyhow::Result<()> {
        self.record(format!("toggle:{category}:{checked}"));
        Ok(())
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub surface: Arc<RecordingSurface>,
    pub scheduler: Arc<RecordingScheduler>,
    pub storage: Arc<MemoryStorage>,
}

pub fn harness(cfg: AppConfig) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let surface = Arc::new(RecordingSurface::default());
    let scheduler = Arc::new(RecordingScheduler::default());
    let store: StateStore = mapstate_core::api::new_store(&cfg, storage.clone());
    let services = Services {
        scheduler: scheduler.clone(),
        materializer: surface.clone(),
        renderer: surface.clone(),
        handlers: surface.clone(),
    };
    Harness {
        ctx: AppContext::new(cfg, store, services),
        surface,
        scheduler,
        storage,
    }
}
