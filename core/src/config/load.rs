use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default mapstate data directory: ~/.mapstate
pub fn get_mapstate_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".mapstate"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("Failed to parse config {:?}", path))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.mapstate/config.toml
    let data_dir = get_mapstate_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml
    let local_config = Path::new("config.toml");

    let mut cfg = if home_config.exists() {
        load_from_path(&home_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |name| std::env::var(name).ok());
    Ok(cfg)
}

// Environment variable overrides (highest priority)
fn apply_env_overrides(cfg: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("MAPSTATE_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = non_empty("MAPSTATE_DEBOUNCE_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => cfg.sync.debounce_ms = ms,
            Err(_) => tracing::warn!("ignoring invalid MAPSTATE_DEBOUNCE_MS={}", v),
        }
    }
    if let Some(v) = non_empty("MAPSTATE_STORAGE_DIR") {
        cfg.store.storage_dir = Some(v);
    }
}
