//! Daily loop: sleep until the wake time, run a cycle, repeat.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use livesite_core::{Agent, AnthropicGenerator, RandomSource};
use tracing::{error, info};

use super::run::cycle;
use crate::utils::{load_config, random_source};

/// Run forever. A failed cycle is logged and the loop waits for the next day.
pub async fn execute(config_path: &Path, seed: Option<u64>) -> Result<()> {
    let config = load_config(config_path)?;
    let wake = config.schedule.wake_time()?;
    let generator = AnthropicGenerator::from_config(&config.generator)
        .context("failed to configure the generator")?;
    let mut rng = random_source(seed);

    let offset = if config.schedule.random_factor {
        jitter(&mut rng, config.schedule.jitter_hours)
    } else {
        TimeDelta::zero()
    };
    let agent = Agent::new(config)?;
    info!(
        wake = %wake.format("%H:%M"),
        offset_minutes = offset.num_minutes(),
        "schedule started"
    );

    loop {
        let now = Local::now();
        let next = next_wake(now, wake, offset);
        info!(at = %next.format("%Y-%m-%d %H:%M"), "sleeping until next cycle");
        let delay = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;

        if let Err(e) = cycle(&agent, &generator, &mut rng).await {
            error!("{e:#}");
        }
    }
}

/// Offset applied to every wake time, uniform in `[-hours, +hours]`.
fn jitter(rng: &mut dyn RandomSource, hours: u32) -> TimeDelta {
    let span = i64::from(hours) * 60;
    if span == 0 {
        return TimeDelta::zero();
    }
    let roll = rng.next_f64().mul_add(2.0, -1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let minutes = (roll * span as f64).round() as i64;
    TimeDelta::minutes(minutes.clamp(-span, span))
}

/// First instant strictly after `now` matching `wake + offset`.
fn next_wake(now: DateTime<Local>, wake: NaiveTime, offset: TimeDelta) -> DateTime<Local> {
    let mut candidate = now.date_naive().and_time(wake) + offset;
    loop {
        // Local times in a DST gap do not exist; try the next day instead
        if let Some(at) = candidate.and_local_timezone(Local).earliest() {
            if at > now {
                return at;
            }
        }
        candidate += TimeDelta::days(1);
    }
}
