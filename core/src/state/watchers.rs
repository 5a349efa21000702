use crate::util::path::overlaps;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked as `(new_value, old_value)`; `None` means absent.
pub type WatchCallback =
    Arc<dyn Fn(Option<&Value>, Option<&Value>) -> anyhow::Result<()> + Send + Sync>;

pub(crate) struct WatcherEntry {
    pub id: u64,
    active: AtomicBool,
    pub callback: WatchCallback,
}

impl WatcherEntry {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Per-path subscriber lists kept in registration order.
#[derive(Default)]
pub(crate) struct WatcherRegistry {
    next_id: u64,
    by_path: HashMap<String, Vec<Arc<WatcherEntry>>>,
}

impl WatcherRegistry {
    pub fn register(&mut self, path: &str, callback: WatchCallback) -> u64 {
        self.next_id += 1;
        let entry = Arc::new(WatcherEntry {
            id: self.next_id,
            active: AtomicBool::new(true),
            callback,
        });
        self.by_path.entry(path.to_string()).or_default().push(entry);
        self.next_id
    }

    /// Deactivate and drop the watcher. Deactivation makes an in-flight
    /// dispatch skip it if it has not been reached yet.
    pub fn unregister(&mut self, path: &str, id: u64) -> bool {
        let Some(list) = self.by_path.get_mut(path) else {
            return false;
        };
        let Some(pos) = list.iter().position(|w| w.id == id) else {
            return false;
        };
        let entry = list.remove(pos);
        entry.active.store(false, Ordering::Release);
        if list.is_empty() {
            self.by_path.remove(path);
        }
        true
    }

    /// Watchers registered for `path`, in registration order.
    pub fn snapshot(&self, path: &str) -> Vec<Arc<WatcherEntry>> {
        self.by_path.get(path).cloned().unwrap_or_default()
    }

    /// Watchers whose path overlaps `path`, grouped by watched path. The
    /// exact path comes first, the rest in path order.
    pub fn related(&self, path: &str) -> Vec<(String, Vec<Arc<WatcherEntry>>)> {
        let mut others: Vec<&str> = self
            .by_path
            .keys()
            .map(String::as_str)
            .filter(|p| *p != path && overlaps(p, path))
            .collect();
        others.sort_unstable();
        std::iter::once(path)
            .chain(others)
            .map(|p| (p.to_string(), self.snapshot(p)))
            .filter(|(_, entries)| !entries.is_empty())
            .collect()
    }

    pub fn observes(&self, path: &str) -> bool {
        self.by_path.keys().any(|p| overlaps(p, path))
    }

    pub fn count(&self, path: &str) -> usize {
        self.by_path.get(path).map_or(0, Vec::len)
    }
}
