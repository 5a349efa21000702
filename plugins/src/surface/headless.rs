//! Headless rendering surface.
//!
//! Keeps a registry of attached features per category and mirrors the
//! control state into the store:
//! - `labels.<category>.<key>`: materialized label text
//! - `checked.<category>.<key>`: checkbox state, follows `emphasised`
//! - `selectAll.<category>`: true when every attached feature is checked
//!
//! Categories and keys must not contain `.`; they become path segments.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use mapstate_core::api::{
    ActiveListRenderer, LabelMaterializer, LabelRequest, StateFacade, StateStore, SyncHandlers,
};

const CHECKED_ROOT: &str = "checked";
const SELECT_ALL_ROOT: &str = "selectAll";

#[derive(Clone)]
pub struct HeadlessSurface {
    facade: StateFacade,
    inner: Arc<Mutex<SurfaceState>>,
}

#[derive(Default)]
struct SurfaceState {
    attached: BTreeMap<String, BTreeSet<String>>,
    active_list: Vec<String>,
    refreshes: usize,
    materialized: usize,
}

impl HeadlessSurface {
    pub fn new(store: StateStore) -> Self {
        Self {
            facade: StateFacade::new(store),
            inner: Arc::new(Mutex::new(SurfaceState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Put a feature on the surface.
    pub fn attach(&self, category: &str, key: &str) {
        self.state()
            .attached
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// Take a feature off the surface. Pending labels for it become stale.
    pub fn detach(&self, category: &str, key: &str) -> bool {
        let mut st = self.state();
        let Some(keys) = st.attached.get_mut(category) else {
            return false;
        };
        let removed = keys.remove(key);
        if keys.is_empty() {
            st.attached.remove(category);
        }
        removed
    }

    pub fn attached(&self, category: &str) -> Vec<String> {
        self.state()
            .attached
            .get(category)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `category/key` entries of the last rendered active list.
    pub fn active_list(&self) -> Vec<String> {
        self.state().active_list.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.state().refreshes
    }

    pub fn materialized_count(&self) -> usize {
        self.state().materialized
    }

    fn categories(&self) -> Vec<(String, Vec<String>)> {
        self.state()
            .attached
            .iter()
            .map(|(c, keys)| (c.clone(), keys.iter().cloned().collect()))
            .collect()
    }

    fn emphasised_entries(&self) -> Vec<String> {
        let mut entries = Vec::new();
        if let Some(Value::Object(categories)) = self.facade.store().get_opt("emphasised") {
            for (category, keys) in categories {
                if let Value::Object(keys) = keys {
                    for (key, on) in keys {
                        if on.as_bool() == Some(true) {
                            entries.push(format!("{category}/{key}"));
                        }
                    }
                }
            }
        }
        entries
    }
}

impl LabelMaterializer for HeadlessSurface {
    fn is_live(&self, request: &LabelRequest) -> bool {
        self.state()
            .attached
            .get(&request.category)
            .is_some_and(|keys| keys.contains(&request.key))
    }

    fn materialize(&self, request: &LabelRequest) -> Result<()> {
        let text = request.text.clone().unwrap_or_else(|| request.key.clone());
        let label = match request.anchor {
            Some(anchor) => json!({ "text": text, "lat": anchor.lat, "lng": anchor.lng }),
            None => json!({ "text": text }),
        };
        self.facade.set_label(&request.category, &request.key, label)?;
        self.state().materialized += 1;
        Ok(())
    }
}

impl ActiveListRenderer for HeadlessSurface {
    fn refresh(&self) -> Result<()> {
        let entries = self.emphasised_entries();
        tracing::debug!(items = entries.len(), "active list rendered");
        let mut st = self.state();
        st.active_list = entries;
        st.refreshes += 1;
        Ok(())
    }
}

#[async_trait]
impl SyncHandlers for HeadlessSurface {
    async fn sync_checkboxes(&self) -> Result<()> {
        let store = self.facade.store();
        for (category, keys) in self.categories() {
            for key in keys {
                let on = self.facade.is_emphasised(&category, &key);
                store.set(&format!("{CHECKED_ROOT}.{category}.{key}"), on)?;
            }
        }
        Ok(())
    }

    async fn sync_select_all_controls(&self) -> Result<()> {
        let store = self.facade.store();
        for (category, keys) in self.categories() {
            let all = keys.iter().all(|k| self.facade.is_emphasised(&category, k));
            store.set(&format!("{SELECT_ALL_ROOT}.{category}"), all)?;
        }
        Ok(())
    }

    async fn sync_active_list(&self) -> Result<()> {
        self.refresh()
    }

    async fn sync_category_toggle(&self, category: &str, checked: bool) -> Result<()> {
        for key in self.attached(category) {
            self.facade.set_emphasised(category, &key, checked)?;
        }
        self.facade.set_category_active(category, checked)?;
        Ok(())
    }
}
