//! 批量操作协调器
//!
//! 两态状态机 `Idle -> Active -> Idle`。激活期间标签创建请求进入待处理队列，
//! 活动列表刷新请求合并为一个标志；`end` 时统一落地。嵌套 `begin` 被拒绝而不是排队。

use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::batch::DeferredBatchProcessor;
use super::types::{BulkFlushReport, BulkOperation, BulkOperationStatus, LabelRequest};
use crate::state::{EventBus, StateEvent};
use crate::traits::{ActiveListRenderer, LabelMaterializer};
use crate::util::lock;

#[derive(Clone)]
pub struct BulkOperationCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    /// `Some` while Active.
    slot: Mutex<Option<BulkOperation>>,
    processor: DeferredBatchProcessor,
    materializer: Arc<dyn LabelMaterializer>,
    renderer: Arc<dyn ActiveListRenderer>,
    events: EventBus,
}

impl BulkOperationCoordinator {
    pub fn new(
        processor: DeferredBatchProcessor,
        materializer: Arc<dyn LabelMaterializer>,
        renderer: Arc<dyn ActiveListRenderer>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                slot: Mutex::new(None),
                processor,
                materializer,
                renderer,
                events,
            }),
        }
    }

    /// Enter the Active state. Returns false (and changes nothing) if a bulk
    /// operation is already running.
    pub fn begin(&self, operation_type: &str, item_count: usize) -> bool {
        {
            let mut slot = lock(&self.inner.slot);
            if let Some(current) = slot.as_ref() {
                tracing::warn!(
                    active = %current.operation_type,
                    requested = %operation_type,
                    "bulk operation already active, rejecting nested begin"
                );
                return false;
            }
            *slot = Some(BulkOperation::new(operation_type, item_count));
        }

        tracing::info!(operation = %operation_type, item_count, "bulk operation started");
        self.inner.events.emit(StateEvent::BulkOperationStarted {
            operation_type: operation_type.to_string(),
            item_count,
            timestamp: Utc::now(),
        });
        true
    }

    /// Leave the Active state and flush deferred work. Returns `None` (after
    /// logging) when no bulk operation is active.
    pub async fn end(&self) -> Option<BulkFlushReport> {
        // 先切回 Idle，落地过程中产生的副作用直接执行
        let taken = lock(&self.inner.slot).take();
        let Some(op) = taken else {
            tracing::warn!("end called with no active bulk operation");
            return None;
        };

        let BulkOperation {
            operation_type,
            item_count,
            started,
            pending_labels,
            pending_active_list_update,
            ..
        } = op;

        let labels = if pending_labels.is_empty() {
            Default::default()
        } else {
            self.inner
                .processor
                .process(pending_labels, self.inner.materializer.as_ref())
                .await
        };

        let active_list_refreshed = pending_active_list_update && self.refresh_active_list();

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            operation = %operation_type,
            duration_ms,
            labels = labels.materialized,
            "bulk operation ended"
        );
        self.inner.events.emit(StateEvent::BulkOperationEnded {
            operation_type: operation_type.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        Some(BulkFlushReport {
            operation_type,
            item_count,
            duration_ms,
            labels,
            active_list_refreshed,
        })
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner.slot).is_some()
    }

    pub fn status(&self) -> Option<BulkOperationStatus> {
        lock(&self.inner.slot).as_ref().map(BulkOperation::status)
    }

    /// Queue a label for the end-of-bulk flush. Returns false when no bulk
    /// operation is active; the caller should materialize directly.
    pub fn add_pending_label(&self, request: LabelRequest) -> bool {
        self.try_defer(request).is_ok()
    }

    /// Coalesce an active-list refresh into the end-of-bulk flush. Returns
    /// false when no bulk operation is active.
    pub fn mark_active_list_update_pending(&self) -> bool {
        match lock(&self.inner.slot).as_mut() {
            Some(op) => {
                op.pending_active_list_update = true;
                true
            }
            None => false,
        }
    }

    /// Defer the label if a bulk operation is active, otherwise materialize
    /// it now. Returns whether the label was deferred.
    pub fn request_label(&self, request: LabelRequest) -> bool {
        // 锁在 try_defer 返回时已释放，之后才调用渲染层
        let request = match self.try_defer(request) {
            Ok(()) => return true,
            Err(request) => request,
        };
        if !self.inner.materializer.is_live(&request) {
            tracing::debug!(category = %request.category, key = %request.key, "skipping stale label");
            return false;
        }
        if let Err(e) = self.inner.materializer.materialize(&request) {
            tracing::error!(
                category = %request.category,
                key = %request.key,
                "label materialization failed: {:#}",
                e
            );
        }
        false
    }

    /// Defer the refresh if a bulk operation is active, otherwise refresh now.
    /// Returns whether the refresh was deferred.
    pub fn request_active_list_refresh(&self) -> bool {
        if self.mark_active_list_update_pending() {
            return true;
        }
        self.refresh_active_list();
        false
    }

    fn try_defer(&self, request: LabelRequest) -> Result<(), LabelRequest> {
        match lock(&self.inner.slot).as_mut() {
            Some(op) => {
                op.pending_labels.push(request);
                Ok(())
            }
            None => Err(request),
        }
    }

    fn refresh_active_list(&self) -> bool {
        match self.inner.renderer.refresh() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("active list refresh failed: {:#}", e);
                false
            }
        }
    }
}
