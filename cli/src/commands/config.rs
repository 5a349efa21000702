//! `config`: print the effective configuration
use crate::error::CliError;
use mapstate_core::api::AppConfig;

pub fn render_config(cfg: &AppConfig) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
}
