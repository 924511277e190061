//! Analyze command: show what the next cycle would work on.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use livesite_core::Agent;

use crate::output::{OutputFormat, print_analysis};
use crate::utils::{load_config, random_source};

/// Print the staleness report. Nothing on disk changes.
pub fn execute(config_path: &Path, seed: Option<u64>, format: OutputFormat) -> Result<()> {
    let agent = Agent::new(load_config(config_path)?)?;
    let mut rng = random_source(seed);
    let report = agent.analyze(Utc::now(), &mut rng)?;
    print_analysis(&report, format)
}
