//! CLI argument definitions for evmux.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// evmux -- event multiplexing kernel driver.
#[derive(Parser)]
#[command(
    name = "evmux",
    version,
    about = "evmux -- replay and stress the event multiplexing kernel",
    long_about = "Builds an event registry, registers listeners against (index, type) pairs, \
                  and reports every backend enable/disable transition and delivery."
)]
pub struct Cli {
    /// Default log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scenario file and print the backend transcript.
    Replay {
        /// Scenario file (TOML).
        #[arg(long, short, default_value = "config/default.toml")]
        config: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Hammer one registry from many concurrent tasks and verify that
    /// every reference count returns to zero.
    Stress {
        /// Event type bits per index.
        #[arg(long, default_value_t = 8)]
        types: u32,

        /// Number of indices.
        #[arg(long, default_value_t = 4)]
        indices: usize,

        /// Concurrent listener tasks.
        #[arg(long, default_value_t = 16)]
        listeners: usize,

        /// Arm/trigger/disarm rounds per listener task.
        #[arg(long, default_value_t = 1000)]
        rounds: usize,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a scenario file without running it.
    CheckConfig {
        /// Scenario file (TOML).
        #[arg(long, short, default_value = "config/default.toml")]
        config: PathBuf,
    },
}
