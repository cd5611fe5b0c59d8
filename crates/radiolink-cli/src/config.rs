//! CLI configuration
//!
//! A TOML file with two tables: `[radio]` is the scheduler configuration from
//! `radiolink-core`, `[simulator]` shapes the simulated hardware. Missing
//! keys fall back to defaults.

use std::path::Path;

use radiolink_core::{DeviceId, RadioConfig};
use serde::{Deserialize, Serialize};

use crate::cli::{OutputFormat, Preset};
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Simulator Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay before the simulated hardware reports back
    pub latency_ms: u64,
    /// Devices that never answer a connection attempt
    pub unreachable: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            latency_ms: 30,
            unreachable: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn unreachable_devices(&self) -> Result<Vec<DeviceId>> {
        self.unreachable
            .iter()
            .map(|address| {
                address
                    .parse::<DeviceId>()
                    .map_err(|e| CliError::Config(format!("simulator.unreachable: {}", e)))
            })
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub radio: RadioConfig,
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    pub fn preset(preset: Preset) -> Self {
        let radio = match preset {
            Preset::Default => RadioConfig::default(),
            Preset::Testing => RadioConfig::testing(),
            Preset::LowLatency => RadioConfig::low_latency(),
        };
        Self {
            radio,
            simulator: SimulatorConfig::default(),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Toml => toml::to_string_pretty(self)?,
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.radio.validate()?;
        self.simulator.unreachable_devices()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [radio.scheduler]
            tick_interval_ms = 10

            [simulator]
            unreachable = ["AA:BB:CC:DD:EE:FF"]
            "#,
        )
        .unwrap();

        assert_eq!(config.radio.scheduler.tick_interval_ms, 10);
        assert_eq!(config.radio.timeouts, RadioConfig::default().timeouts);
        assert_eq!(config.simulator.latency_ms, 30);
        assert_eq!(config.simulator.unreachable_devices().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::from_toml("[radio.scheduler]\ntick_interval_ms = 0\n");
        assert!(matches!(result, Err(CliError::Config(_))));

        let result = AppConfig::from_toml("[simulator]\nunreachable = [\"nope\"]\n");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_render_round_trips_through_toml() {
        let config = AppConfig::preset(Preset::LowLatency);
        let rendered = config.render(OutputFormat::Toml).unwrap();
        assert_eq!(AppConfig::from_toml(&rendered).unwrap(), config);
        assert!(config.render(OutputFormat::Json).unwrap().contains("tick_interval_ms"));
    }
}
