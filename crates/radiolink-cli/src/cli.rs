//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scenario against a simulated radio
    Simulate {
        #[arg(short, long, value_enum)]
        scenario: Scenario,

        /// Simulated hardware latency for every operation
        #[arg(short, long)]
        latency_ms: Option<u64>,

        /// Print outcomes as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print a configuration preset
    Config {
        #[arg(short, long, value_enum, default_value_t = Preset::Default)]
        preset: Preset,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Toml)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Power on, connect, discover, read and write, then disconnect
    Connect,
    /// Tasks submitted out of order run by priority
    Priority,
    /// Turning the radio off cancels a pending connection
    Preempt,
    /// A connection to an unreachable device times out
    Timeout,
    /// Work that is already done resolves as redundant
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Default,
    Testing,
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Toml,
    Json,
}
