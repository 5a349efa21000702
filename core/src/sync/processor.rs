//! 同步队列处理器
//!
//! 触发先进入 FIFO 队列；每次入队都会重置去抖定时器（后到者生效），
//! 但已入队的操作不会被丢弃。定时器到期且当前没有正在执行的轮次时，
//! 队列中已到期的操作按入队顺序执行。失败的操作带着固定退避的截止时间
//! 留在队列中，新的触发不会让它提前重试；超过最大尝试次数后记入历史并发出错误事件。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::types::{SyncOperation, SyncOutcome, SyncRecord, SyncStatus, SyncTrigger};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::state::{EventBus, StateEvent};
use crate::traits::SyncHandlers;
use crate::util::{lock, RingBuffer};

const COMPONENT: &str = "SyncQueueProcessor";

#[derive(Clone)]
pub struct SyncQueueProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    config: SyncConfig,
    handlers: Arc<dyn SyncHandlers>,
    events: EventBus,
    state: Mutex<QueueState>,
    /// Held for the duration of a pass; only one pass runs at a time.
    pass_lock: tokio::sync::Mutex<()>,
}

struct QueueState {
    queue: VecDeque<SyncOperation>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every arm so a superseded timer that already woke up
    /// does nothing.
    timer_generation: u64,
    timer_deadline: Option<Instant>,
    heartbeat: Option<JoinHandle<()>>,
    rerun_requested: bool,
    processing: bool,
    next_id: u64,
    history: RingBuffer<SyncRecord>,
    passes: u64,
    total_syncs: u64,
    successful_syncs: u64,
    failed_syncs: u64,
    last_sync_at: Option<DateTime<Utc>>,
}

impl SyncQueueProcessor {
    pub fn new(config: SyncConfig, handlers: Arc<dyn SyncHandlers>, events: EventBus) -> Self {
        let state = QueueState {
            queue: VecDeque::new(),
            timer: None,
            timer_generation: 0,
            timer_deadline: None,
            heartbeat: None,
            rerun_requested: false,
            processing: false,
            next_id: 0,
            history: RingBuffer::new(config.history_capacity),
            passes: 0,
            total_syncs: 0,
            successful_syncs: 0,
            failed_syncs: 0,
            last_sync_at: None,
        };
        Self {
            inner: Arc::new(ProcessorInner {
                config,
                handlers,
                events,
                state: Mutex::new(state),
                pass_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Start the heartbeat (if configured) and announce readiness. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) {
        if let Some(period) = self.inner.config.heartbeat_interval() {
            let weak = Arc::downgrade(&self.inner);
            let handle = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    SyncQueueProcessor { inner }.queue_sync(SyncTrigger::Heartbeat, Value::Null);
                }
            });
            if let Some(previous) = lock(&self.inner.state).heartbeat.replace(handle) {
                previous.abort();
            }
        }

        tracing::info!(
            debounce_ms = self.inner.config.debounce_ms,
            max_attempts = self.inner.config.max_attempts,
            "state synchronizer ready"
        );
        self.inner.events.emit(StateEvent::SynchronizerReady {
            timestamp: Utc::now(),
        });
    }

    /// Abort the heartbeat and any armed timer. Queued operations stay queued.
    pub fn shutdown(&self) {
        let mut st = lock(&self.inner.state);
        st.timer_generation += 1;
        st.timer_deadline = None;
        if let Some(timer) = st.timer.take() {
            timer.abort();
        }
        if let Some(heartbeat) = st.heartbeat.take() {
            heartbeat.abort();
        }
    }

    /// Enqueue a trigger and (re)arm the debounce timer. Returns the
    /// operation id, or `None` for `Forced`, which only `force_sync` runs.
    /// Must be called from within a tokio runtime.
    pub fn queue_sync(&self, trigger: SyncTrigger, payload: Value) -> Option<u64> {
        if trigger == SyncTrigger::Forced {
            tracing::warn!("forced sync cannot be queued; use force_sync");
            return None;
        }
        let (id, queued) = {
            let mut st = lock(&self.inner.state);
            st.next_id += 1;
            let id = st.next_id;
            st.queue.push_back(SyncOperation::new(id, trigger, payload));
            (id, st.queue.len())
        };
        tracing::debug!(id, trigger = %trigger, queued, "sync queued");
        self.arm_timer(self.inner.config.debounce());
        Some(id)
    }

    /// Drop queued work and run the full resync immediately, waiting for a
    /// running pass to finish first.
    pub async fn force_sync(&self) -> Result<(), SyncError> {
        {
            let mut st = lock(&self.inner.state);
            st.timer_generation += 1;
            st.timer_deadline = None;
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
            let dropped = st.queue.len();
            st.queue.clear();
            if dropped > 0 {
                tracing::debug!(dropped, "force sync superseded queued operations");
            }
        }

        let _pass = self.inner.pass_lock.lock().await;
        let mut op = {
            let mut st = lock(&self.inner.state);
            st.next_id += 1;
            st.passes += 1;
            st.processing = true;
            SyncOperation::new(st.next_id, SyncTrigger::Forced, Value::Null)
        };
        op.attempt_count = 1;

        let result = self.dispatch(&op).await;
        match &result {
            Ok(()) => self.record_success(&op),
            Err(e) => self.record_failure(&op, e),
        }
        self.finish_pass(Vec::new());
        result
    }

    pub fn status(&self) -> SyncStatus {
        let st = lock(&self.inner.state);
        SyncStatus {
            queue_length: st.queue.len(),
            is_processing: st.processing,
            timer_armed: st.timer.is_some(),
            heartbeat_running: st.heartbeat.is_some(),
            passes: st.passes,
            total_syncs: st.total_syncs,
            successful_syncs: st.successful_syncs,
            failed_syncs: st.failed_syncs,
            last_sync_at: st.last_sync_at,
            history: st.history.to_vec(),
        }
    }

    fn arm_timer(&self, delay: Duration) {
        let mut st = lock(&self.inner.state);
        st.timer_generation += 1;
        st.timer_deadline = Some(Instant::now() + delay);
        let generation = st.timer_generation;
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SyncQueueProcessor { inner }.on_timer(generation).await;
            }
        });
        if let Some(previous) = st.timer.replace(handle) {
            previous.abort();
        }
    }

    async fn on_timer(&self, generation: u64) {
        {
            let mut st = lock(&self.inner.state);
            if st.timer_generation != generation {
                return;
            }
            st.timer = None;
            st.timer_deadline = None;
        }

        let Ok(_pass) = self.inner.pass_lock.try_lock() else {
            // 正在执行的轮次结束后会重新布置定时器
            lock(&self.inner.state).rerun_requested = true;
            tracing::debug!("sync pass already running, deferring");
            return;
        };
        self.run_pass().await;
    }

    /// Run every due operation in FIFO order; operations still in backoff
    /// stay queued. Caller holds `pass_lock`.
    async fn run_pass(&self) {
        let batch: Vec<SyncOperation> = {
            let mut st = lock(&self.inner.state);
            st.rerun_requested = false;
            let now = Instant::now();
            let (due, held): (VecDeque<_>, VecDeque<_>) =
                st.queue.drain(..).partition(|op| op.is_due(now));
            st.queue = held;
            if !due.is_empty() {
                st.processing = true;
                st.passes += 1;
            }
            Vec::from(due)
        };
        if batch.is_empty() {
            self.finish_idle();
            return;
        }
        tracing::debug!(operations = batch.len(), "sync pass started");

        let max_attempts = self.inner.config.max_attempts.max(1);
        let mut retries = Vec::new();
        for mut op in batch {
            op.attempt_count += 1;
            let result = self.dispatch(&op).await;
            match result {
                Ok(()) => self.record_success(&op),
                Err(e) if op.attempt_count < max_attempts => {
                    tracing::warn!(
                        id = op.id,
                        trigger = %op.trigger,
                        attempt = op.attempt_count,
                        "sync operation failed, will retry: {}",
                        e
                    );
                    op.not_before = Some(Instant::now() + self.inner.config.retry_delay());
                    retries.push(op);
                }
                Err(e) => self.record_failure(&op, &e),
            }
        }

        self.finish_pass(retries);
    }

    fn finish_pass(&self, retries: Vec<SyncOperation>) {
        {
            let mut st = lock(&self.inner.state);
            st.processing = false;
            st.last_sync_at = Some(Utc::now());
            st.queue.extend(retries);
        }
        self.finish_idle();
    }

    /// Arm the timer for whatever is left: the debounce window for work that
    /// arrived during a pass, the earliest backoff deadline for retries. An
    /// earlier armed timer is left alone.
    fn finish_idle(&self) {
        let delay = {
            let st = lock(&self.inner.state);
            let now = Instant::now();
            let backoff = st
                .queue
                .iter()
                .filter_map(|op| op.not_before)
                .min()
                .map(|at| at.saturating_duration_since(now));
            let rerun = (st.rerun_requested && st.queue.iter().any(|op| op.is_due(now)))
                .then(|| self.inner.config.debounce());
            let Some(delay) = backoff.into_iter().chain(rerun).min() else {
                return;
            };
            if st.timer_deadline.is_some_and(|at| at <= now + delay) {
                return;
            }
            delay
        };
        self.arm_timer(delay);
    }

    async fn dispatch(&self, op: &SyncOperation) -> Result<(), SyncError> {
        let handlers = &self.inner.handlers;
        let trigger = op.trigger;
        match trigger {
            SyncTrigger::DataCategoryLoaded | SyncTrigger::Heartbeat | SyncTrigger::Forced => {
                self.full_resync(trigger).await?;
            }
            SyncTrigger::DataCategoryErrored => {
                handlers
                    .sync_select_all_controls()
                    .await
                    .map_err(handler_error(trigger))?;
            }
            SyncTrigger::FeatureLayerChanged => {
                handlers
                    .sync_active_list()
                    .await
                    .map_err(handler_error(trigger))?;
            }
            SyncTrigger::CheckboxChanged => {
                handlers
                    .sync_select_all_controls()
                    .await
                    .map_err(handler_error(trigger))?;
                handlers
                    .sync_active_list()
                    .await
                    .map_err(handler_error(trigger))?;
            }
            SyncTrigger::ToggleAllChanged => {
                let (category, checked) = toggle_payload(&op.payload)?;
                handlers
                    .sync_category_toggle(&category, checked)
                    .await
                    .map_err(handler_error(trigger))?;
                handlers
                    .sync_active_list()
                    .await
                    .map_err(handler_error(trigger))?;
            }
        }
        Ok(())
    }

    async fn full_resync(&self, trigger: SyncTrigger) -> Result<(), SyncError> {
        let handlers = &self.inner.handlers;
        handlers
            .sync_checkboxes()
            .await
            .map_err(handler_error(trigger))?;
        handlers
            .sync_select_all_controls()
            .await
            .map_err(handler_error(trigger))?;
        handlers
            .sync_active_list()
            .await
            .map_err(handler_error(trigger))
    }

    fn record_success(&self, op: &SyncOperation) {
        let mut st = lock(&self.inner.state);
        st.total_syncs += 1;
        st.successful_syncs += 1;
        st.history.push(history_entry(op, SyncOutcome::Succeeded));
    }

    fn record_failure(&self, op: &SyncOperation, error: &SyncError) {
        {
            let mut st = lock(&self.inner.state);
            st.total_syncs += 1;
            st.failed_syncs += 1;
            st.history.push(history_entry(
                op,
                SyncOutcome::Failed {
                    error: error.to_string(),
                },
            ));
        }
        tracing::error!(
            id = op.id,
            trigger = %op.trigger,
            attempts = op.attempt_count,
            "sync operation permanently failed: {}",
            error
        );
        self.inner.events.emit(StateEvent::SynchronizerError {
            error: error.to_string(),
            component: COMPONENT.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn handler_error(trigger: SyncTrigger) -> impl Fn(anyhow::Error) -> SyncError {
    move |source| SyncError::Handler {
        trigger: trigger.to_string(),
        source,
    }
}

fn history_entry(op: &SyncOperation, outcome: SyncOutcome) -> SyncRecord {
    SyncRecord {
        id: op.id,
        trigger: op.trigger,
        payload: op.payload.clone(),
        attempts: op.attempt_count,
        outcome,
        enqueued_at: op.enqueued_at,
        completed_at: Utc::now(),
    }
}

fn toggle_payload(payload: &Value) -> Result<(String, bool), SyncError> {
    let category = payload
        .get("category")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SyncError::InvalidPayload {
            trigger: SyncTrigger::ToggleAllChanged.to_string(),
            reason: "missing category".to_string(),
        })?;
    let checked = payload
        .get("checked")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok((category.to_string(), checked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Records every handler call; fails the first `fail_first` calls.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_first: AtomicUsize,
    }

    impl Recorder {
        fn failing(n: usize) -> Self {
            Self {
                fail_first: AtomicUsize::new(n),
                ..Self::default()
            }
        }

        fn hit(&self, name: String) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(name);
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("handler unavailable");
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SyncHandlers for Recorder {
        async fn sync_checkboxes(&self) -> anyhow::Result<()> {
            self.hit("checkboxes".into())
        }
        async fn sync_select_all_controls(&self) -> anyhow::Result<()> {
            self.hit("selectAll".into())
        }
        async fn sync_active_list(&self) -> anyhow::Result<()> {
            self.hit("activeList".into())
        }
        async fn sync_category_toggle(&self, category: &str, checked: bool) -> anyhow::Result<()> {
            self.hit(format!("toggle:{category}:{checked}"))
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            debounce_ms: 100,
            max_attempts: 3,
            retry_delay_ms: 250,
            heartbeat_interval_ms: 0,
            history_capacity: 50,
        }
    }

    fn processor(recorder: Arc<Recorder>, cfg: SyncConfig) -> (SyncQueueProcessor, EventBus) {
        let events = EventBus::default();
        (
            SyncQueueProcessor::new(cfg, recorder, events.clone()),
            events,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_pass() {
        let recorder = Arc::new(Recorder::default());
        let (sync, _) = processor(recorder.clone(), config());

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(
                sync.queue_sync(
                    SyncTrigger::CheckboxChanged,
                    json!({"category": "cfa", "key": "x1", "checked": true}),
                )
                .unwrap(),
            );
            sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(sync.status().passes, 0);
        assert_eq!(sync.status().queue_length, 5);

        sleep(Duration::from_millis(150)).await;
        let status = sync.status();
        assert_eq!(status.passes, 1);
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.successful_syncs, 5);
        let processed: Vec<u64> = status.history.iter().map(|r| r.id).collect();
        assert_eq!(processed, ids);
        assert_eq!(recorder.calls().len(), 10);

        sync.queue_sync(SyncTrigger::FeatureLayerChanged, Value::Null);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(sync.status().passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation_is_bounded() {
        let recorder = Arc::new(Recorder::failing(usize::MAX));
        let (sync, events) = processor(recorder.clone(), config());
        let mut rx = events.subscribe();

        sync.queue_sync(SyncTrigger::FeatureLayerChanged, Value::Null);
        sleep(Duration::from_secs(5)).await;

        assert_eq!(recorder.calls(), vec!["activeList"; 3]);
        let status = sync.status();
        assert_eq!(status.failed_syncs, 1);
        assert_eq!(status.successful_syncs, 0);
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.history.len(), 1);
        assert!(status.history[0].is_failed());
        assert_eq!(status.history[0].attempts, 3);

        let errors: Vec<StateEvent> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.name() == "stateSynchronizer:error")
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let recorder = Arc::new(Recorder::failing(1));
        let (sync, _) = processor(recorder.clone(), config());

        sync.queue_sync(SyncTrigger::DataCategoryErrored, json!({"category": "police"}));
        sleep(Duration::from_millis(120)).await;
        assert_eq!(sync.status().queue_length, 1);

        sleep(Duration::from_millis(300)).await;
        let status = sync.status();
        assert_eq!(status.successful_syncs, 1);
        assert_eq!(status.failed_syncs, 0);
        assert_eq!(status.history[0].attempts, 2);
        assert_eq!(status.passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_trigger_does_not_shorten_backoff() {
        let recorder = Arc::new(Recorder::failing(1));
        let (sync, _) = processor(recorder.clone(), config());

        sync.queue_sync(SyncTrigger::DataCategoryErrored, json!({"category": "police"}));
        // first attempt fails at 100ms; retry is due at 350ms
        sleep(Duration::from_millis(110)).await;
        sync.queue_sync(SyncTrigger::FeatureLayerChanged, Value::Null);

        sleep(Duration::from_millis(110)).await;
        assert_eq!(recorder.calls(), vec!["selectAll", "activeList"]);
        assert_eq!(sync.status().queue_length, 1);

        sleep(Duration::from_millis(120)).await;
        assert_eq!(recorder.calls().len(), 2);

        sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.calls(), vec!["selectAll", "activeList", "selectAll"]);
        let status = sync.status();
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.successful_syncs, 2);
        assert_eq!(status.passes, 3);
        let retried = status.history.iter().find(|r| r.id == 1).unwrap();
        assert_eq!(retried.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_trigger_is_not_queued() {
        let recorder = Arc::new(Recorder::default());
        let (sync, _) = processor(recorder.clone(), config());

        assert_eq!(sync.queue_sync(SyncTrigger::Forced, Value::Null), None);
        let status = sync.status();
        assert_eq!(status.queue_length, 0);
        assert!(!status.timer_armed);

        sleep(Duration::from_millis(200)).await;
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_dispatch_uses_payload() {
        let recorder = Arc::new(Recorder::default());
        let (sync, _) = processor(recorder.clone(), config());

        sync.queue_sync(
            SyncTrigger::ToggleAllChanged,
            json!({"category": "ses", "checked": true}),
        );
        sync.queue_sync(SyncTrigger::DataCategoryLoaded, json!({"category": "ses"}));
        sleep(Duration::from_millis(200)).await;

        assert_eq!(
            recorder.calls(),
            vec![
                "toggle:ses:true",
                "activeList",
                "checkboxes",
                "selectAll",
                "activeList"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_toggle_payload_fails() {
        let recorder = Arc::new(Recorder::default());
        let cfg = SyncConfig {
            max_attempts: 1,
            ..config()
        };
        let (sync, _) = processor(recorder.clone(), cfg);

        sync.queue_sync(SyncTrigger::ToggleAllChanged, json!({"checked": true}));
        sleep(Duration::from_millis(200)).await;

        let status = sync.status();
        assert_eq!(status.failed_syncs, 1);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_sync_bypasses_debounce() {
        let recorder = Arc::new(Recorder::default());
        let (sync, _) = processor(recorder.clone(), config());

        sync.queue_sync(SyncTrigger::CheckboxChanged, Value::Null);
        sync.queue_sync(SyncTrigger::CheckboxChanged, Value::Null);
        sync.force_sync().await.unwrap();

        assert_eq!(recorder.calls(), vec!["checkboxes", "selectAll", "activeList"]);
        let status = sync.status();
        assert_eq!(status.queue_length, 0);
        assert!(!status.timer_armed);
        assert_eq!(status.passes, 1);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sync.status().passes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_sync_failure_is_reported() {
        let recorder = Arc::new(Recorder::failing(1));
        let (sync, events) = processor(recorder, config());
        let mut rx = events.subscribe();

        assert!(sync.force_sync().await.is_err());
        assert_eq!(sync.status().failed_syncs, 1);
        assert_eq!(rx.try_recv().unwrap().name(), "stateSynchronizer:error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_triggers_full_resync() {
        let recorder = Arc::new(Recorder::default());
        let cfg = SyncConfig {
            heartbeat_interval_ms: 1000,
            ..config()
        };
        let (sync, events) = processor(recorder.clone(), cfg);
        let mut rx = events.subscribe();

        sync.start();
        assert_eq!(rx.try_recv().unwrap().name(), "stateSynchronizer:ready");
        assert!(sync.status().heartbeat_running);

        sleep(Duration::from_millis(2150)).await;
        let status = sync.status();
        assert_eq!(status.passes, 2);
        assert!(status
            .history
            .iter()
            .all(|r| r.trigger == SyncTrigger::Heartbeat));

        sync.shutdown();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(sync.status().passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let recorder = Arc::new(Recorder::default());
        let cfg = SyncConfig {
            history_capacity: 2,
            ..config()
        };
        let (sync, _) = processor(recorder, cfg);
        for _ in 0..3 {
            sync.queue_sync(SyncTrigger::FeatureLayerChanged, Value::Null);
        }
        sleep(Duration::from_millis(200)).await;

        let status = sync.status();
        assert_eq!(status.successful_syncs, 3);
        assert_eq!(status.history.len(), 2);
        assert_eq!(status.history[0].id, 2);
    }
}
