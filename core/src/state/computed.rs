//! 计算属性：依赖路径变更时立即重算，读取时返回缓存值

use super::manager::StateStore;
use crate::util::path::overlaps;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub type ComputedGetter = Arc<dyn Fn(&StateStore) -> anyhow::Result<Value> + Send + Sync>;

struct ComputedProperty {
    getter: ComputedGetter,
    deps: Vec<String>,
    cached: Option<Value>,
    dirty: bool,
}

#[derive(Default)]
pub(crate) struct ComputedEngine {
    props: HashMap<String, ComputedProperty>,
    /// Registration order, so recomputes are deterministic.
    order: Vec<String>,
}

impl ComputedEngine {
    pub fn register(&mut self, name: &str, getter: ComputedGetter, deps: Vec<String>) {
        if !self.props.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.props.insert(
            name.to_string(),
            ComputedProperty {
                getter,
                deps,
                cached: None,
                dirty: true,
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.props.remove(name).is_some()
    }

    /// Mark every property with a dependency for which `changed` holds dirty
    /// and return their getters.
    pub fn invalidate(
        &mut self,
        mut changed: impl FnMut(&str) -> bool,
    ) -> Vec<(String, ComputedGetter)> {
        let mut out = Vec::new();
        for name in &self.order {
            if let Some(prop) = self.props.get_mut(name) {
                if prop.deps.iter().any(|d| changed(d.as_str())) {
                    prop.dirty = true;
                    out.push((name.clone(), prop.getter.clone()));
                }
            }
        }
        out
    }

    /// Whether any dependency overlaps `path`.
    pub fn observes(&self, path: &str) -> bool {
        self.props
            .values()
            .any(|p| p.deps.iter().any(|d| overlaps(d, path)))
    }

    /// Cached value if clean, otherwise the getter to recompute with.
    pub fn lookup(&self, name: &str) -> Option<Result<Value, ComputedGetter>> {
        let prop = self.props.get(name)?;
        match (&prop.cached, prop.dirty) {
            (Some(v), false) => Some(Ok(v.clone())),
            _ => Some(Err(prop.getter.clone())),
        }
    }

    pub fn fulfil(&mut self, name: &str, value: Value) {
        if let Some(prop) = self.props.get_mut(name) {
            prop.cached = Some(value);
            prop.dirty = false;
        }
    }

    pub fn deps(&self, name: &str) -> Option<&[String]> {
        self.props.get(name).map(|p| p.deps.as_slice())
    }
}
