//! # CLI Structure and Argument Parsing
//!
//! `livesite` has one mode per invocation:
//!
//! - no mode flag: run forever, waking once a day at `schedule.wake_time`
//! - `--now`: run a single cycle immediately
//! - `--setup`: write the default config, document and state, then exit
//! - `--analyze`: print the staleness ranking and the target a cycle would
//!   pick, without changing anything
//!
//! ```bash
//! livesite --setup --config ./livesite.toml
//! livesite --analyze --format json
//! livesite --now -v
//! livesite --log-file livesite.log
//! ```

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::output::OutputFormat;

/// Main CLI structure for the `livesite` command
#[derive(Parser, Clone, Debug)]
#[command(name = "livesite")]
#[command(version)]
#[command(about = "livesite - a scheduled agent that keeps a website evolving", long_about = None)]
#[command(group(ArgGroup::new("mode").args(["now", "setup", "analyze"])))]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Run one cycle immediately and exit
    #[arg(long)]
    pub now: bool,

    /// Create the default config, document and state file, then exit
    #[arg(long)]
    pub setup: bool,

    /// Print the staleness ranking and the would-be target without writing
    #[arg(long)]
    pub analyze: bool,

    /// Config file (defaults to $LIVESITE_CONFIG, ./livesite.toml, then the
    /// platform config directory)
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format for reports
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Seed the random source, for reproducible selections
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Debug-level logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Disable all ANSI colors in output (also respects `NO_COLOR` env)
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

/// Selected mode of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Daily loop.
    Schedule,
    /// One cycle now.
    Now,
    /// Materialize defaults.
    Setup,
    /// Read-only report.
    Analyze,
}

impl Cli {
    /// Mode selected by the flags.
    pub const fn mode(&self) -> Mode {
        if self.setup {
            Mode::Setup
        } else if self.analyze {
            Mode::Analyze
        } else if self.now {
            Mode::Now
        } else {
            Mode::Schedule
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_modes() {
        let parse = |args: &[&str]| Cli::try_parse_from(args).unwrap().mode();
        assert_eq!(parse(&["livesite"]), Mode::Schedule);
        assert_eq!(parse(&["livesite", "--now"]), Mode::Now);
        assert_eq!(parse(&["livesite", "--setup"]), Mode::Setup);
        assert_eq!(parse(&["livesite", "--analyze", "--format", "json"]), Mode::Analyze);
    }

    #[test]
    fn test_modes_are_exclusive() {
        assert!(Cli::try_parse_from(["livesite", "--now", "--setup"]).is_err());
    }
}
