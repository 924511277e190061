//! Shared helpers for command handlers.

pub mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use livesite_core::{Config, StdRandom};

pub use logging::initialize_logging;

/// Resolve the config path for this invocation.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    Config::locate(explicit).context("could not determine the config file location")
}

/// Load and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("invalid configuration in {}", path.display()))
}

/// Seeded source when `--seed` was given, entropy otherwise.
pub fn random_source(seed: Option<u64>) -> StdRandom {
    seed.map_or_else(StdRandom::from_entropy, StdRandom::seeded)
}
