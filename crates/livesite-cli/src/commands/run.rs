//! Run command: one cycle, right now.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use livesite_core::{Agent, AnthropicGenerator, CycleReport, Generator, RandomSource};
use tracing::info;

use crate::output::{OutputFormat, print_cycle};
use crate::utils::{load_config, random_source};

/// Run a single cycle and print its report.
pub async fn execute(config_path: &Path, seed: Option<u64>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let generator = AnthropicGenerator::from_config(&config.generator)
        .context("failed to configure the generator")?;
    let agent = Agent::new(config)?;
    let mut rng = random_source(seed);

    let report = cycle(&agent, &generator, &mut rng).await?;
    print_cycle(&report, format)
}

/// One cycle with logging around it, shared with the daily loop.
pub(crate) async fn cycle(
    agent: &Agent,
    generator: &dyn Generator,
    rng: &mut dyn RandomSource,
) -> Result<CycleReport> {
    let report = agent
        .run_cycle(generator, Utc::now(), rng)
        .await
        .context("cycle failed")?;
    info!(
        section = %report.target,
        applied = report.outcome.is_applied(),
        modified = report.modified_sections.len(),
        "cycle finished"
    );
    Ok(report)
}
