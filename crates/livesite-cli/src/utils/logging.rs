//! Logging initialization and configuration.
//!
//! Sets up the tracing subscriber and color control from CLI flags and
//! environment variables.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use colored::control as color_control;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Cli, Mode};
use crate::output::OutputFormat;

/// Level selected by the verbosity flags. Machine-readable reports drop to
/// errors only, unless verbose or debug output was asked for.
pub fn log_level(cli: &Cli) -> Level {
    if cli.verbose || cli.debug {
        Level::DEBUG
    } else if cli.quiet || machine_output(cli) {
        Level::ERROR
    } else {
        Level::INFO
    }
}

fn machine_output(cli: &Cli) -> bool {
    cli.format == OutputFormat::Json && cli.mode() != Mode::Schedule
}

/// Initialize the logging subsystem based on CLI flags.
///
/// Logs go to stderr, or are appended to `--log-file` without colors.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or the global tracing
/// subscriber cannot be set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = log_level(cli);

    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    // Color control: disable when requested, NO_COLOR is set, or when emitting machine output
    let env_no_color = std::env::var("NO_COLOR").ok().is_some();
    if cli.no_color || env_no_color || machine_output(cli) {
        color_control::set_override(false);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    fn level(args: &[&str]) -> Level {
        log_level(&Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn test_levels_follow_flags() {
        assert_eq!(level(&["livesite"]), Level::INFO);
        assert_eq!(level(&["livesite", "-v"]), Level::DEBUG);
        assert_eq!(level(&["livesite", "--debug"]), Level::DEBUG);
        assert_eq!(level(&["livesite", "-q"]), Level::ERROR);
    }

    #[test]
    fn test_json_reports_are_quiet_unless_verbose() {
        assert_eq!(level(&["livesite", "--analyze", "--format", "json"]), Level::ERROR);
        assert_eq!(
            level(&["livesite", "--analyze", "--format", "json", "-v"]),
            Level::DEBUG
        );
        // The daily loop has no report to protect
        assert_eq!(level(&["livesite", "--format", "json"]), Level::INFO);
    }
}
