//! Setup command: materialize the default config, document and state.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use livesite_core::{Agent, Config};
use tracing::info;

use crate::output::{OutputFormat, print_setup};
use crate::utils::load_config;

/// Write whatever is missing, leaving existing files alone.
pub fn execute(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config_created = Config::write_default(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    if config_created {
        info!(path = %config_path.display(), "wrote default configuration");
    }

    let config = load_config(config_path)?;
    let document = config.website.path.clone();
    let state = config.entity.state_file.clone();
    let agent = Agent::new(config)?;
    let report = agent.setup(Utc::now())?;

    print_setup(
        config_path,
        config_created,
        &document,
        &state,
        &report,
        format,
    )
}
