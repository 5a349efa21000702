use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use mapstate_core::api::SyncTrigger;

#[derive(Parser, Debug)]
#[command(name = "mapstate", version, about = "Drive the mapstate state engine from the shell")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Stream emitted state events to stdout as JSON lines.
    #[arg(long, global = true)]
    pub events: bool,

    /// Read config from this file instead of the default locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for persisted snapshots (overrides `store.storage_dir`).
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one bulk operation over a category of synthetic features.
    Simulate(SimulateArgs),
    /// Queue sync triggers and wait for the debounced pass.
    Sync(SyncArgs),
    /// Write a snapshot of the state tree.
    Persist(PersistArgs),
    /// Read a snapshot back into the state tree and print the result.
    Restore(RestoreArgs),
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long, default_value = "ses")]
    pub category: String,

    #[arg(long, default_value_t = 50)]
    pub items: usize,

    /// Number of features removed from the surface while the bulk operation
    /// is still running.
    #[arg(long, default_value_t = 0)]
    pub stale: usize,

    #[arg(long, default_value = "toggleAll")]
    pub operation: String,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerArg {
    DataLoaded,
    DataErrored,
    LayerChanged,
    Checkbox,
    ToggleAll,
    Heartbeat,
}

impl From<TriggerArg> for SyncTrigger {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::DataLoaded => SyncTrigger::DataCategoryLoaded,
            TriggerArg::DataErrored => SyncTrigger::DataCategoryErrored,
            TriggerArg::LayerChanged => SyncTrigger::FeatureLayerChanged,
            TriggerArg::Checkbox => SyncTrigger::CheckboxChanged,
            TriggerArg::ToggleAll => SyncTrigger::ToggleAllChanged,
            TriggerArg::Heartbeat => SyncTrigger::Heartbeat,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SyncArgs {
    #[arg(long, value_enum)]
    pub trigger: TriggerArg,

    #[arg(long, default_value_t = 1)]
    pub count: usize,

    #[arg(long, default_value = "ses")]
    pub category: String,

    /// `checked` payload for toggle-all triggers.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub checked: bool,

    /// Run a forced full resync after the queued pass.
    #[arg(long)]
    pub force: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PersistArgs {
    #[arg(long)]
    pub key: String,

    /// Only persist these paths. Can be specified multiple times.
    #[arg(long = "path", action = clap::ArgAction::Append)]
    pub paths: Vec<String>,

    /// Seed the tree before persisting (PATH=JSON). Can be specified multiple times.
    #[arg(long = "set", action = clap::ArgAction::Append)]
    pub set: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RestoreArgs {
    #[arg(long)]
    pub key: String,

    /// Replace the tree instead of merging into it.
    #[arg(long)]
    pub replace: bool,
}
