//! 面向旧调用方的状态门面
//!
//! Legacy call sites that used to read mirrored globals receive a
//! `StateFacade` explicitly instead.

use super::manager::StateStore;
use crate::error::StateError;
use serde_json::Value;

pub const EMPHASISED_ROOT: &str = "emphasised";
pub const LABELS_ROOT: &str = "labels";
pub const ACTIVE_CATEGORIES: &str = "activeCategories";

/// Typed helpers over well-known state paths.
#[derive(Clone)]
pub struct StateFacade {
    store: StateStore,
}

impl StateFacade {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn is_emphasised(&self, category: &str, key: &str) -> bool {
        self.store
            .get_opt(&format!("{EMPHASISED_ROOT}.{category}.{key}"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn set_emphasised(&self, category: &str, key: &str, on: bool) -> Result<(), StateError> {
        self.store
            .set(&format!("{EMPHASISED_ROOT}.{category}.{key}"), on)
    }

    pub fn label(&self, category: &str, key: &str) -> Option<Value> {
        self.store.get_opt(&format!("{LABELS_ROOT}.{category}.{key}"))
    }

    pub fn set_label(&self, category: &str, key: &str, label: Value) -> Result<(), StateError> {
        self.store
            .set(&format!("{LABELS_ROOT}.{category}.{key}"), label)
    }

    pub fn clear_label(&self, category: &str, key: &str) -> Result<bool, StateError> {
        self.store
            .delete(&format!("{LABELS_ROOT}.{category}.{key}"))
    }

    pub fn active_categories(&self) -> Vec<String> {
        match self.store.get_opt(ACTIVE_CATEGORIES) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_category_active(&self, category: &str, active: bool) -> Result<(), StateError> {
        let mut categories = self.active_categories();
        let present = categories.iter().any(|c| c == category);
        match (active, present) {
            (true, false) => categories.push(category.to_string()),
            (false, true) => categories.retain(|c| c != category),
            _ => return Ok(()),
        }
        self.store.set(ACTIVE_CATEGORIES, categories)
    }
}
