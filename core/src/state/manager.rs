//! 状态存储
//!
//! 所有状态读写都经过显式的 `get` / `set` / `delete`；写入依次经过中间件、
//! 相等性比较、提交、事件广播、监听器回调和计算属性重算。
//! 用户回调执行期间不持有任何锁，因此回调内可以再次读写状态。

use super::computed::{ComputedEngine, ComputedGetter};
use super::events::EventBus;
use super::middleware::{run_pipeline, MiddlewareId, MiddlewarePipeline};
use super::types::StateEvent;
use super::watchers::WatcherRegistry;
use crate::error::StateError;
use crate::persistence::{PersistenceAdapter, PersistenceSnapshot};
use crate::util::lock;
use crate::util::path as tree_path;
use chrono::Utc;
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;

/// 状态存储（可克隆的句柄）
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StateStoreInner>,
}

struct StateStoreInner {
    /// 状态树，根节点始终是对象
    tree: Mutex<Value>,
    watchers: Mutex<WatcherRegistry>,
    computed: Mutex<ComputedEngine>,
    middleware: Mutex<MiddlewarePipeline>,
    events: EventBus,
    persistence: PersistenceAdapter,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_parts(EventBus::default(), PersistenceAdapter::in_memory())
    }

    pub fn with_parts(events: EventBus, persistence: PersistenceAdapter) -> Self {
        let inner = StateStoreInner {
            tree: Mutex::new(Value::Object(Map::new())),
            watchers: Mutex::new(WatcherRegistry::default()),
            computed: Mutex::new(ComputedEngine::default()),
            middleware: Mutex::new(MiddlewarePipeline::default()),
            events,
            persistence,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    /// 订阅状态事件
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.events.subscribe()
    }

    /// Current value at `path`, or `default` when absent.
    pub fn get(&self, path: &str, default: Value) -> Value {
        self.get_opt(path).unwrap_or(default)
    }

    pub fn get_opt(&self, path: &str) -> Option<Value> {
        let segments = tree_path::split_path(path).ok()?;
        let tree = lock(&self.inner.tree);
        tree_path::lookup(&tree, &segments).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        self.get_opt(path).is_some()
    }

    /// Deep copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        lock(&self.inner.tree).clone()
    }

    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<(), StateError> {
        let segments = tree_path::split_path(path)?;
        let old = {
            let tree = lock(&self.inner.tree);
            tree_path::lookup(&tree, &segments).cloned()
        };

        let pipeline = lock(&self.inner.middleware).snapshot();
        let value = run_pipeline(&pipeline, path, value.into(), old.as_ref());

        if old.as_ref() == Some(&value) {
            tracing::trace!(path = %path, "value unchanged");
            return Ok(());
        }

        let observed = self.observed(path);
        let prior = {
            let mut tree = lock(&self.inner.tree);
            let prior = observed.then(|| Prior::capture(&tree, &segments));
            tree_path::insert(&mut tree, &segments, value.clone());
            prior
        };
        self.notify(path, &segments, Some(value), old, prior)
    }

    /// Batch form of `set`: every entry runs the full pipeline. All entries
    /// are applied even if one fails; the first error is returned.
    pub fn set_many<I, K, V>(&self, entries: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut first_err = None;
        for (path, value) in entries {
            if let Err(e) = self.set(path.as_ref(), value) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Remove `path`. Returns whether anything was removed.
    pub fn delete(&self, path: &str) -> Result<bool, StateError> {
        let segments = tree_path::split_path(path)?;
        let observed = self.observed(path);
        let (removed, prior) = {
            let mut tree = lock(&self.inner.tree);
            let prior = observed.then(|| Prior::capture(&tree, &segments));
            (tree_path::remove(&mut tree, &segments), prior)
        };
        match removed {
            Some(old) => {
                self.notify(path, &segments, None, Some(old), prior)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Register a watcher on `path`. The callback receives `(new, old)`.
    pub fn watch<F>(&self, path: &str, callback: F) -> Result<WatchHandle, StateError>
    where
        F: Fn(Option<&Value>, Option<&Value>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        tree_path::split_path(path)?;
        let id = lock(&self.inner.watchers).register(path, Arc::new(callback));
        Ok(WatchHandle {
            store: Arc::downgrade(&self.inner),
            path: path.to_string(),
            id,
        })
    }

    pub fn watcher_count(&self, path: &str) -> usize {
        lock(&self.inner.watchers).count(path)
    }

    /// Register a computed property. The getter is evaluated immediately and
    /// again whenever one of `deps` changes; the initial value is returned.
    pub fn computed<F>(&self, name: &str, getter: F, deps: &[&str]) -> Result<Value, StateError>
    where
        F: Fn(&StateStore) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        for dep in deps {
            tree_path::split_path(dep)?;
        }
        let getter: ComputedGetter = Arc::new(getter);
        lock(&self.inner.computed).register(
            name,
            getter.clone(),
            deps.iter().map(|d| d.to_string()).collect(),
        );
        self.evaluate(name, &getter)
    }

    /// Cached computed value, recomputed first if the cache is dirty.
    pub fn computed_value(&self, name: &str) -> Result<Option<Value>, StateError> {
        let cached = lock(&self.inner.computed).lookup(name);
        match cached {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(getter)) => self.evaluate(name, &getter).map(Some),
        }
    }

    pub fn computed_deps(&self, name: &str) -> Option<Vec<String>> {
        lock(&self.inner.computed).deps(name).map(<[String]>::to_vec)
    }

    pub fn remove_computed(&self, name: &str) -> bool {
        lock(&self.inner.computed).remove(name)
    }

    pub fn add_middleware<F>(&self, middleware: F) -> MiddlewareId
    where
        F: Fn(&str, Value, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        lock(&self.inner.middleware).add(Arc::new(middleware))
    }

    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        lock(&self.inner.middleware).remove(id)
    }

    /// Build a snapshot of the whole tree, or of the listed paths.
    pub fn capture(&self, paths: Option<&[&str]>) -> PersistenceSnapshot {
        match paths {
            None => PersistenceSnapshot::whole(self.snapshot()),
            Some(paths) => {
                let mut values = Map::new();
                for path in paths {
                    if let Some(value) = self.get_opt(path) {
                        values.insert(path.to_string(), value);
                    }
                }
                PersistenceSnapshot::subset(paths.iter().map(|p| p.to_string()).collect(), values)
            }
        }
    }

    /// Persist the whole tree or `paths` under `key`. Failures are logged only.
    pub fn persist(&self, key: &str, paths: Option<&[&str]>) {
        let snapshot = self.capture(paths);
        match self.inner.persistence.save(key, &snapshot) {
            Ok(()) => tracing::info!(
                key = %key,
                storage = self.inner.persistence.storage_name(),
                "state persisted"
            ),
            Err(e) => tracing::error!(key = %key, "persist failed: {}", e),
        }
    }

    /// Restore the snapshot stored under `key`. With `merge` the stored paths
    /// overwrite current values; without it the tree is replaced. A missing or
    /// unreadable snapshot leaves the state untouched.
    pub fn restore(&self, key: &str, merge: bool) {
        let snapshot = match self.inner.persistence.load(key) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(key = %key, "restore failed: {}", e);
                return;
            }
        };
        self.apply_snapshot(&snapshot, merge);
        tracing::info!(key = %key, merge, "state restored");
    }

    /// Apply a snapshot through the normal write pipeline.
    pub fn apply_snapshot(&self, snapshot: &PersistenceSnapshot, merge: bool) {
        if merge {
            for (path, value) in snapshot.entries() {
                if let Err(e) = self.set(&path, value) {
                    tracing::warn!(path = %path, "restore write failed: {}", e);
                }
            }
            return;
        }

        let mut target = Value::Object(Map::new());
        for (path, value) in snapshot.entries() {
            if let Ok(segments) = tree_path::split_path(&path) {
                tree_path::insert(&mut target, &segments, value);
            }
        }
        let target = match target {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let current: Vec<String> = match &*lock(&self.inner.tree) {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        for key in current.iter().filter(|k| !target.contains_key(*k)) {
            if let Err(e) = self.delete(key) {
                tracing::warn!(path = %key, "restore delete failed: {}", e);
            }
        }
        for (key, value) in target {
            if let Err(e) = self.set(&key, value) {
                tracing::warn!(path = %key, "restore write failed: {}", e);
            }
        }
    }

    /// Whether any watcher or computed dependency overlaps `path`.
    fn observed(&self, path: &str) -> bool {
        lock(&self.inner.watchers).observes(path) || lock(&self.inner.computed).observes(path)
    }

    fn notify(
        &self,
        path: &str,
        segments: &[&str],
        value: Option<Value>,
        old_value: Option<Value>,
        prior: Option<Prior>,
    ) -> Result<(), StateError> {
        tracing::debug!(path = %path, "state changed");

        let events = &self.inner.events;
        if events.has_subscribers() {
            let timestamp = Utc::now();
            events.emit(StateEvent::StateChanged {
                path: path.to_string(),
                value: value.clone(),
                old_value: old_value.clone(),
                state: self.snapshot(),
                timestamp,
            });
            events.emit(StateEvent::PathChanged {
                path: path.to_string(),
                value: value.clone(),
                old_value: old_value.clone(),
                timestamp,
            });
        }

        let Some(prior) = prior else {
            return Ok(());
        };
        let change = Change {
            path,
            value,
            old_value,
            before: prior.0,
            after: Prior::capture(&lock(&self.inner.tree), segments).0,
        };
        self.dispatch_watchers(&change);
        self.recompute_dependents(&change)
    }

    fn dispatch_watchers(&self, change: &Change<'_>) {
        let groups = lock(&self.inner.watchers).related(change.path);
        for (watched, watchers) in groups {
            let Some((value, old_value)) = change.at(&watched) else {
                continue;
            };
            for watcher in watchers {
                // 同一轮分发中被其他回调注销的监听器不再调用
                if !watcher.is_active() {
                    continue;
                }
                let call = || (watcher.callback)(value.as_ref(), old_value.as_ref());
                match catch_unwind(AssertUnwindSafe(call)) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(path = %watched, watcher = watcher.id, "watcher failed: {:#}", e)
                    }
                    Err(_) => tracing::error!(path = %watched, watcher = watcher.id, "watcher panicked"),
                }
            }
        }
    }

    fn recompute_dependents(&self, change: &Change<'_>) -> Result<(), StateError> {
        let dependents = lock(&self.inner.computed).invalidate(|dep| change.at(dep).is_some());
        let mut first_err = None;
        for (name, getter) in dependents {
            match self.evaluate(&name, &getter) {
                Ok(value) => self.inner.events.emit(StateEvent::ComputedChanged {
                    name,
                    value,
                    timestamp: Utc::now(),
                }),
                Err(e) => {
                    tracing::error!(computed = %name, "recompute failed: {}", e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn evaluate(&self, name: &str, getter: &ComputedGetter) -> Result<Value, StateError> {
        let value = getter(self).map_err(|source| StateError::ComputedGetter {
            name: name.to_string(),
            source,
        })?;
        lock(&self.inner.computed).fulfil(name, value.clone());
        Ok(value)
    }
}

/// Top-level subtree holding a written path, captured around the commit.
/// Every path overlapping the written one lives under it.
struct Prior(Option<Value>);

impl Prior {
    fn capture(tree: &Value, segments: &[&str]) -> Self {
        Self(tree_path::lookup(tree, &segments[..1]).cloned())
    }
}

struct Change<'a> {
    path: &'a str,
    value: Option<Value>,
    old_value: Option<Value>,
    before: Option<Value>,
    after: Option<Value>,
}

impl Change<'_> {
    /// `(new, old)` at `watched` if the write changed the value there.
    fn at(&self, watched: &str) -> Option<(Option<Value>, Option<Value>)> {
        if watched == self.path {
            return Some((self.value.clone(), self.old_value.clone()));
        }
        if !tree_path::overlaps(watched, self.path) {
            return None;
        }
        let segments = tree_path::split_path(watched).ok()?;
        let resolve = |root: &Option<Value>| {
            root.as_ref()
                .and_then(|r| tree_path::lookup(r, &segments[1..]))
                .cloned()
        };
        let (new, old) = (resolve(&self.after), resolve(&self.before));
        (new != old).then_some((new, old))
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by `StateStore::watch`. Dropping it keeps the watcher registered.
#[derive(Clone)]
pub struct WatchHandle {
    store: Weak<StateStoreInner>,
    path: String,
    id: u64,
}

impl WatchHandle {
    /// Unregister the watcher. Idempotent, and safe to call from inside the
    /// watcher's own callback.
    pub fn unwatch(&self) -> bool {
        match self.store.upgrade() {
            Some(inner) => lock(&inner.watchers).unregister(&self.path, self.id),
            None => false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn drain(rx: &mut broadcast::Receiver<StateEvent>) -> Vec<StateEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_set_get_round_trip() {
        let store = StateStore::new();
        store.set("emphasised.ses.unit1", true).unwrap();
        assert_eq!(store.get("emphasised.ses.unit1", json!(false)), json!(true));
        assert_eq!(store.get("emphasised.ses.unit2", json!(false)), json!(false));
        assert_eq!(
            store.snapshot(),
            json!({"emphasised": {"ses": {"unit1": true}}})
        );
    }

    #[test]
    fn test_invalid_path() {
        let store = StateStore::new();
        assert!(matches!(
            store.set("a..b", 1),
            Err(StateError::InvalidPath(_))
        ));
        assert!(store.get_opt("").is_none());
    }

    #[test]
    fn test_same_value_emits_once() {
        let store = StateStore::new();
        let mut rx = store.subscribe();
        store.set("a.b", 1).unwrap();
        store.set("a.b", 1).unwrap();

        let names: Vec<String> = drain(&mut rx).iter().map(StateEvent::name).collect();
        assert_eq!(names, vec!["stateChange", "state:a.b"]);
    }

    #[test]
    fn test_state_change_carries_snapshot() {
        let store = StateStore::new();
        store.set("x", 1).unwrap();
        let mut rx = store.subscribe();
        store.set("y", 2).unwrap();

        match &drain(&mut rx)[0] {
            StateEvent::StateChanged {
                path,
                value,
                old_value,
                state,
                ..
            } => {
                assert_eq!(path, "y");
                assert_eq!(value, &Some(json!(2)));
                assert_eq!(old_value, &None);
                assert_eq!(state, &json!({"x": 1, "y": 2}));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_watcher_fires_with_new_and_old() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store
            .watch("emphasised.ses.unit1", move |new, old| {
                sink.lock()
                    .unwrap()
                    .push((new.cloned(), old.cloned()));
                Ok(())
            })
            .unwrap();

        store.set("emphasised.ses.unit1", true).unwrap();
        store.set("emphasised.ses.unit1", true).unwrap();
        store.delete("emphasised.ses.unit1").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Some(json!(true)), None), (None, Some(json!(true)))]
        );
    }

    #[test]
    fn test_unwatch_stops_callbacks() {
        let store = StateStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handle = store
            .watch("a", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        store.set("a", 1).unwrap();
        assert!(handle.unwatch());
        assert!(!handle.unwatch());
        store.set("a", 2).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_unwatch_keeps_siblings() {
        let store = StateStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<WatchHandle>>> = Arc::new(Mutex::new(None));

        let (o, s) = (order.clone(), slot.clone());
        let handle = store
            .watch("a", move |_, _| {
                o.lock().unwrap().push("first");
                if let Some(h) = s.lock().unwrap().as_ref() {
                    h.unwatch();
                }
                Ok(())
            })
            .unwrap();
        *slot.lock().unwrap() = Some(handle);

        let o = order.clone();
        store
            .watch("a", move |_, _| {
                o.lock().unwrap().push("second");
                Ok(())
            })
            .unwrap();

        store.set("a", 1).unwrap();
        store.set("a", 2).unwrap();
        assert_eq!(
            *order.lock().unwrap(),
            vec!["first", "second", "second"]
        );
    }

    #[test]
    fn test_failing_watcher_is_isolated() {
        let store = StateStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        store
            .watch("a", |_, _| anyhow::bail!("boom"))
            .unwrap();
        store
            .watch("a", |_, _| panic!("watcher panic"))
            .unwrap();
        let counter = hits.clone();
        store
            .watch("a", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        store.set("a", 1).unwrap();
        assert_eq!(store.get("a", Value::Null), json!(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_watcher_can_write_back() {
        let store = StateStore::new();
        let writer = store.clone();
        store
            .watch("count", move |new, _| {
                writer.set("mirror", new.cloned().unwrap_or(Value::Null))?;
                Ok(())
            })
            .unwrap();
        store.set("count", 3).unwrap();
        assert_eq!(store.get("mirror", Value::Null), json!(3));
    }

    #[test]
    fn test_middleware_transforms_and_can_be_removed() {
        let store = StateStore::new();
        let id = store.add_middleware(|path, value, _old| {
            if path.starts_with("labels.") {
                json!(value.as_str().unwrap_or_default().to_uppercase())
            } else {
                value
            }
        });
        store.set("labels.ses.unit1", "north").unwrap();
        assert_eq!(store.get("labels.ses.unit1", Value::Null), json!("NORTH"));

        assert!(store.remove_middleware(id));
        store.set("labels.ses.unit1", "south").unwrap();
        assert_eq!(store.get("labels.ses.unit1", Value::Null), json!("south"));
    }

    #[test]
    fn test_middleware_result_equal_to_old_suppresses_change() {
        let store = StateStore::new();
        store.set("locked", 1).unwrap();
        store.add_middleware(|path, value, old| match (path, old) {
            ("locked", Some(old)) => old.clone(),
            _ => value,
        });
        let mut rx = store.subscribe();
        store.set("locked", 99).unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(store.get("locked", Value::Null), json!(1));
    }

    #[test]
    fn test_set_many() {
        let store = StateStore::new();
        store
            .set_many([("a.x", json!(1)), ("b", json!("two"))])
            .unwrap();
        assert_eq!(store.snapshot(), json!({"a": {"x": 1}, "b": "two"}));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let store = StateStore::new();
        let mut rx = store.subscribe();
        assert!(!store.delete("nothing.here").unwrap());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_computed_recomputes_on_dependency_change() {
        let store = StateStore::new();
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        let initial = store
            .computed(
                "sum",
                |s| {
                    let a = s.get("a", json!(0)).as_i64().unwrap_or(0);
                    let b = s.get("b", json!(0)).as_i64().unwrap_or(0);
                    Ok(json!(a + b))
                },
                &["a", "b"],
            )
            .unwrap();
        assert_eq!(initial, json!(3));

        let mut rx = store.subscribe();
        store.set("a", 10).unwrap();
        let computed: Vec<StateEvent> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.name() == "computed:sum")
            .collect();
        assert_eq!(computed.len(), 1);
        match &computed[0] {
            StateEvent::ComputedChanged { value, .. } => assert_eq!(value, &json!(12)),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(store.computed_value("sum").unwrap(), Some(json!(12)));
    }

    #[test]
    fn test_computed_ignores_unrelated_and_unchanged() {
        let store = StateStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store
            .computed(
                "a2",
                move |s| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(s.get("a", json!(0)))
                },
                &["a"],
            )
            .unwrap();
        store.set("b", 1).unwrap();
        store.set("a", 0).unwrap();
        store.set("a", 0).unwrap();
        assert_eq!(store.computed_value("a2").unwrap(), Some(json!(0)));
        // registration + one real change of `a`
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_computed_getter_error_propagates() {
        let store = StateStore::new();
        store
            .computed(
                "strict",
                |s| match s.get_opt("n") {
                    Some(Value::String(_)) => anyhow::bail!("n must be numeric"),
                    other => Ok(other.unwrap_or(json!(0))),
                },
                &["n"],
            )
            .unwrap();

        let err = store.set("n", "oops").unwrap_err();
        assert!(matches!(err, StateError::ComputedGetter { ref name, .. } if name == "strict"));
        // The write itself committed.
        assert_eq!(store.get("n", Value::Null), json!("oops"));
        // The dirty cache is recomputed (and fails again) on read.
        assert!(store.computed_value("strict").is_err());

        store.set("n", 5).unwrap();
        assert_eq!(store.computed_value("strict").unwrap(), Some(json!(5)));
    }

    fn recording_watcher(
        store: &StateStore,
        path: &str,
    ) -> Arc<Mutex<Vec<(Option<Value>, Option<Value>)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store
            .watch(path, move |new, old| {
                sink.lock().unwrap().push((new.cloned(), old.cloned()));
                Ok(())
            })
            .unwrap();
        seen
    }

    fn mirror_computed(store: &StateStore, name: &str, path: &'static str) {
        store
            .computed(name, move |s| Ok(s.get(path, Value::Null)), &[path])
            .unwrap();
    }

    #[test]
    fn test_ancestor_write_reaches_nested_observers() {
        let store = StateStore::new();
        let seen = recording_watcher(&store, "emphasised.ses.unit1");
        mirror_computed(&store, "unit1", "emphasised.ses.unit1");

        store
            .set("emphasised", json!({"ses": {"unit1": true}}))
            .unwrap();
        assert_eq!(store.computed_value("unit1").unwrap(), Some(json!(true)));

        // unit1 keeps its value, so nothing fires
        store
            .set("emphasised.ses", json!({"unit1": true, "unit2": false}))
            .unwrap();

        store.delete("emphasised").unwrap();
        assert_eq!(store.computed_value("unit1").unwrap(), Some(Value::Null));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Some(json!(true)), None), (None, Some(json!(true)))]
        );
    }

    #[test]
    fn test_nested_write_reaches_ancestor_watcher() {
        let store = StateStore::new();
        store.set("a", 5).unwrap();
        let seen = recording_watcher(&store, "a");

        store.set("a.b", "x").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Some(json!({"b": "x"})), Some(json!(5)))]
        );
    }

    #[test]
    fn test_merge_restore_reaches_nested_observers() {
        let store = StateStore::new();
        store.set("emphasised.ses.unit1", true).unwrap();
        mirror_computed(&store, "unit1", "emphasised.ses.unit1");
        store.persist("prefs", Some(&["emphasised"][..]));
        store.set("emphasised.ses.unit1", false).unwrap();

        let seen = recording_watcher(&store, "emphasised.ses.unit1");
        store.restore("prefs", true);

        assert_eq!(store.get("emphasised.ses.unit1", Value::Null), json!(true));
        assert_eq!(store.computed_value("unit1").unwrap(), Some(json!(true)));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Some(json!(true)), Some(json!(false)))]
        );
    }

    #[test]
    fn test_replace_restore_reaches_nested_observers() {
        let store = StateStore::new();
        store.set("view.zoom", 9).unwrap();
        store.persist("all", None);
        store.set("view.zoom", 12).unwrap();
        store.set("scratch.note", "tmp").unwrap();

        let zoom = recording_watcher(&store, "view.zoom");
        let note = recording_watcher(&store, "scratch.note");
        store.restore("all", false);

        assert_eq!(*zoom.lock().unwrap(), vec![(Some(json!(9)), Some(json!(12)))]);
        assert_eq!(*note.lock().unwrap(), vec![(None, Some(json!("tmp")))]);
    }

    #[test]
    fn test_unknown_computed_is_none() {
        let store = StateStore::new();
        assert!(store.computed_value("missing").unwrap().is_none());
        assert!(!store.remove_computed("missing"));
    }

    #[test]
    fn test_persist_restore_merge_keeps_unrelated() {
        let store = StateStore::new();
        store.set("emphasised.ses.unit1", true).unwrap();
        store.set("view.zoom", 9).unwrap();
        store.persist("prefs", Some(&["emphasised"][..]));

        store.set("emphasised.ses.unit1", false).unwrap();
        store.set("view.zoom", 12).unwrap();
        store.restore("prefs", true);

        assert_eq!(store.get("emphasised.ses.unit1", Value::Null), json!(true));
        assert_eq!(store.get("view.zoom", Value::Null), json!(12));
    }

    #[test]
    fn test_restore_replace() {
        let store = StateStore::new();
        store.set("a.x", 1).unwrap();
        store.persist("all", None);
        store.set("a.y", 2).unwrap();
        store.set("b", 3).unwrap();

        store.restore("all", false);
        assert_eq!(store.snapshot(), json!({"a": {"x": 1}}));
    }

    #[test]
    fn test_restore_missing_key_leaves_state() {
        let store = StateStore::new();
        store.set("a", 1).unwrap();
        store.restore("never-saved", false);
        assert_eq!(store.snapshot(), json!({"a": 1}));
    }
}
