//! Radio Link CLI library
//!
//! Scripted scenarios that drive the scheduler against a simulated radio,
//! plus configuration loading shared with the `radiolink` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod scenario;
pub mod simulate;

pub use cli::{Cli, Commands, OutputFormat, Preset, Scenario};
pub use config::{AppConfig, SimulatorConfig};
pub use error::{CliError, Result};
pub use scenario::ScenarioReport;
pub use simulate::SimulatedRadio;
