//! # Output Formatting
//!
//! Reports are printed to stdout as colored text or as a single JSON object.
//! Logs never go to stdout, so `--format json` output can be piped.

use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use livesite_core::staleness::RankedSection;
use livesite_core::{AnalysisReport, CycleReport, PatchOutcome, SetupReport};
use serde::Serialize;

/// Output format for reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One pretty-printed JSON object
    Json,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ranking_line(entry: &RankedSection) -> String {
    let marker = if entry.high_value { "*" } else { " " };
    format!(
        "  {marker} {:>5}d  {:<40} {}",
        entry.days_since,
        entry.identifier,
        entry.kind.as_str().dimmed()
    )
}

/// Print the staleness analysis.
pub fn print_analysis(report: &AnalysisReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    let selection = &report.selection;
    println!(
        "{} {} sections ({} unchanged, {} changed, {} unseen)",
        "Analysis:".bold(),
        selection.ranking.len(),
        report.unchanged.len(),
        report.changed.len(),
        report.unseen.len()
    );
    if !report.changed.is_empty() {
        println!("{}", "Changed outside the agent:".yellow());
        for identifier in &report.changed {
            println!("  {identifier}");
        }
    }

    println!("{}", "Ranking (oldest first, * = high value):".bold());
    for entry in &selection.ranking {
        println!("{}", ranking_line(entry));
    }

    let pool: Vec<_> = selection.pool.iter().map(|c| c.target.label()).collect();
    println!("{} {}", "Pool:".bold(), pool.join(", "));
    println!("{} {}", "Target:".bold(), selection.target.label().green());
    Ok(())
}

/// Print the result of one cycle.
pub fn print_cycle(report: &CycleReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    match &report.outcome {
        PatchOutcome::Applied {
            strategy,
            target_label,
            ..
        } => println!(
            "{} {} via {} ({})",
            "Updated".green().bold(),
            target_label,
            strategy,
            report.classification
        ),
        PatchOutcome::Skipped { reason } => {
            println!("{} {}", "Skipped:".yellow().bold(), reason);
        },
    }
    println!("  target:   {}", report.target);
    if let Some(backup) = &report.backup {
        println!("  backup:   {}", backup.display());
    }
    if !report.modified_sections.is_empty() {
        println!("  modified: {}", report.modified_sections.join(", "));
    }
    println!(
        "  inputs:   {} message(s), {} headline(s)",
        report.messages, report.headlines
    );
    Ok(())
}

#[derive(Serialize)]
struct SetupOutput<'a> {
    config: &'a Path,
    config_created: bool,
    document: &'a Path,
    state: &'a Path,
    #[serde(flatten)]
    report: &'a SetupReport,
}

/// Print what setup created.
pub fn print_setup(
    config: &Path,
    config_created: bool,
    document: &Path,
    state: &Path,
    report: &SetupReport,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&SetupOutput {
            config,
            config_created,
            document,
            state,
            report,
        });
    }

    let status = |created: bool| {
        if created {
            "created".green()
        } else {
            "exists".dimmed()
        }
    };
    println!("{} {}", "config:  ".bold(), config.display());
    println!("           {}", status(config_created));
    println!("{} {}", "document:".bold(), document.display());
    println!("           {}", status(report.document_created));
    println!("{} {}", "state:   ".bold(), state.display());
    println!("           {}", status(report.state_created));
    Ok(())
}
