//! CLI entry point for evmux.
//!
//! This binary provides the `evmux` command with subcommands for replaying
//! scenario files against the event kernel, stress-testing it from many
//! concurrent tasks, and validating scenario files.

mod backend;
mod cli;
mod helpers;
mod scenario;
mod stress;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::init_tracing;
use crate::scenario::{ReplayReport, Scenario};
use crate::stress::{StressParams, StressReport};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Replay { config, json } => cmd_replay(&config, json),
        Commands::Stress {
            types,
            indices,
            listeners,
            rounds,
            json,
        } => {
            let params = StressParams {
                types_nr: types,
                index_nr: indices,
                listeners,
                rounds,
            };
            cmd_stress(params, json).await
        }
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: replay
// ---------------------------------------------------------------------------

fn cmd_replay(path: &Path, json: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    info!(
        path = %path.display(),
        listeners = scenario.listeners.len(),
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let report = scenario.replay()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_replay(&report);
    }
    Ok(())
}

fn print_replay(report: &ReplayReport) {
    println!();
    println!("  Transcript");
    println!("  ----------");
    if report.transcript.is_empty() {
        println!("  (nothing happened)");
    }
    for entry in &report.transcript {
        println!("  {entry}");
    }

    println!();
    println!(
        "  Registry: {} types x {} indices, {} listeners",
        report.stats.types_nr,
        report.stats.index_nr,
        report.stats.total_listeners()
    );
    for index in &report.stats.indices {
        println!(
            "    [{}] listeners={} armed={} active={:?}",
            index.index, index.listeners, index.armed, index.active_types
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Subcommand: stress
// ---------------------------------------------------------------------------

async fn cmd_stress(params: StressParams, json: bool) -> Result<()> {
    let report = stress::run(params).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_stress(&report);
    }
    Ok(())
}

fn print_stress(report: &StressReport) {
    println!();
    println!("  Stress run passed");
    println!("  -----------------");
    println!("  Clients:        {}", report.listeners);
    println!("  Rounds:         {}", report.rounds);
    println!("  Registrations:  {}", report.registrations);
    println!("  Triggers:       {}", report.triggers);
    println!("  Deliveries:     {}", report.deliveries);
    println!("  Enables:        {}", report.enables);
    println!("  Disables:       {}", report.disables);
    println!("  Elapsed:        {} ms", report.elapsed_ms);
    println!();
}

// ---------------------------------------------------------------------------
// Subcommand: check-config
// ---------------------------------------------------------------------------

fn cmd_check_config(path: &Path) -> Result<()> {
    let scenario = Scenario::load(path)?;
    println!(
        "  Config OK ({}): {} types x {} indices, {} listeners, {} steps",
        path.display(),
        scenario.registry.types_nr,
        scenario.registry.index_nr,
        scenario.listeners.len(),
        scenario.steps.len()
    );
    Ok(())
}
