use serde_json::Value;
use std::sync::Arc;

/// `(path, new_value, old_value) -> value to commit`.
pub type Middleware = Arc<dyn Fn(&str, Value, Option<&Value>) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

#[derive(Default)]
pub(crate) struct MiddlewarePipeline {
    next_id: u64,
    entries: Vec<(MiddlewareId, Middleware)>,
}

impl MiddlewarePipeline {
    pub fn add(&mut self, middleware: Middleware) -> MiddlewareId {
        self.next_id += 1;
        let id = MiddlewareId(self.next_id);
        self.entries.push((id, middleware));
        id
    }

    pub fn remove(&mut self, id: MiddlewareId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(mid, _)| *mid != id);
        self.entries.len() != before
    }

    /// Ordered copy so the pipeline can run without holding the lock.
    pub fn snapshot(&self) -> Vec<Middleware> {
        self.entries.iter().map(|(_, m)| m.clone()).collect()
    }
}

pub(crate) fn run_pipeline(
    pipeline: &[Middleware],
    path: &str,
    value: Value,
    old: Option<&Value>,
) -> Value {
    pipeline.iter().fold(value, |v, m| m(path, v, old))
}
