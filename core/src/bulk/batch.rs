//! 延迟标签的分批处理
//!
//! 按类别分组（保持类别首次出现顺序与类别内顺序），每个类别按配置的批大小切分；
//! 除全局最后一批外，每批之后让出一次调度。

use std::sync::Arc;

use super::types::{BatchReport, LabelRequest};
use crate::config::BulkConfig;
use crate::traits::{LabelMaterializer, Scheduler};

#[derive(Clone)]
pub struct DeferredBatchProcessor {
    config: BulkConfig,
    scheduler: Arc<dyn Scheduler>,
}

struct Batch {
    category: String,
    items: Vec<LabelRequest>,
    expensive: bool,
}

impl DeferredBatchProcessor {
    pub fn new(config: BulkConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { config, scheduler }
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    pub async fn process(
        &self,
        requests: Vec<LabelRequest>,
        materializer: &dyn LabelMaterializer,
    ) -> BatchReport {
        let batches = self.plan(requests);
        let mut report = BatchReport::default();
        let total = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            for request in &batch.items {
                if !materializer.is_live(request) {
                    report.stale += 1;
                    continue;
                }
                match materializer.materialize(request) {
                    Ok(()) => report.materialized += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(
                            category = %request.category,
                            key = %request.key,
                            "label materialization failed: {:#}",
                            e
                        );
                    }
                }
            }
            report.batches += 1;

            if index + 1 < total {
                if batch.expensive {
                    self.scheduler.delay(self.config.expensive_delay()).await;
                } else {
                    self.scheduler.next_frame().await;
                }
                report.yields += 1;
            }
            tracing::trace!(category = %batch.category, batch = index + 1, total, "label batch done");
        }

        tracing::debug!(
            materialized = report.materialized,
            stale = report.stale,
            failed = report.failed,
            batches = report.batches,
            "deferred labels processed"
        );
        report
    }

    fn plan(&self, requests: Vec<LabelRequest>) -> Vec<Batch> {
        let mut groups: Vec<(String, Vec<LabelRequest>)> = Vec::new();
        for request in requests {
            match groups.iter_mut().find(|(c, _)| *c == request.category) {
                Some((_, items)) => items.push(request),
                None => groups.push((request.category.clone(), vec![request])),
            }
        }

        let mut batches = Vec::new();
        for (category, items) in groups {
            let size = self.config.batch_size_for(&category);
            let expensive = self.config.is_expensive(&category);
            let mut items = items.into_iter().peekable();
            while items.peek().is_some() {
                batches.push(Batch {
                    category: category.clone(),
                    items: items.by_ref().take(size).collect(),
                    expensive,
                });
            }
        }
        batches
    }
}
