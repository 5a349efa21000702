use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistenceError;
use crate::util::path::split_path;

pub const SNAPSHOT_VERSION: &str = "1";

/// Point-in-time serialization of the state tree or a subset of it.
///
/// A whole-tree snapshot has `paths == None` and `data` is the tree itself.
/// A subset snapshot lists the requested paths and `data` maps each path that
/// was present at persist time to its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceSnapshot {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    pub data: Value,
}

impl PersistenceSnapshot {
    pub fn whole(tree: Value) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            saved_at: Utc::now(),
            paths: None,
            data: tree,
        }
    }

    pub fn subset(paths: Vec<String>, values: Map<String, Value>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            saved_at: Utc::now(),
            paths: Some(paths),
            data: Value::Object(values),
        }
    }

    pub fn is_subset(&self) -> bool {
        self.paths.is_some()
    }

    /// `(path, value)` pairs to apply on restore: stored paths for a subset,
    /// top-level keys for a whole-tree snapshot.
    pub fn entries(&self) -> Vec<(String, Value)> {
        match &self.data {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    /// Top-level keys this snapshot touches.
    pub fn top_level_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(path, _)| path.split('.').next().unwrap_or_default().to_string())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(PersistenceError::Serialize)
    }

    pub fn from_json(key: &str, json: &str) -> Result<Self, PersistenceError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|source| PersistenceError::Deserialize {
                key: key.to_string(),
                source,
            })?;
        if !snapshot.data.is_object() {
            return Err(PersistenceError::InvalidSnapshot {
                key: key.to_string(),
                reason: "data is not an object".to_string(),
            });
        }
        if let Some((bad, _)) = snapshot
            .entries()
            .into_iter()
            .find(|(path, _)| split_path(path).is_err())
        {
            return Err(PersistenceError::InvalidSnapshot {
                key: key.to_string(),
                reason: format!("invalid path {bad:?}"),
            });
        }
        Ok(snapshot)
    }
}
