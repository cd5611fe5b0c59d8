//! Centralized Configuration Management
//!
//! Scheduler timing, per-task timeouts and the presets that combine them.
//! Durations are stored as milliseconds so configuration files stay flat.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::task::TaskKind;

// ----------------------------------------------------------------------------
// Scheduler Configuration
// ----------------------------------------------------------------------------

/// Timing of the worker loop that drives the task queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the update tick; timeouts resolve at this granularity
    pub tick_interval_ms: u64,
    /// Drive ticks from an internal timer. Tests turn this off and tick by hand.
    pub auto_tick: bool,
    /// Idle time enforced between the end of one task and arming the next
    pub delay_between_tasks_ms: Option<u64>,
    /// Expected burst size of worker commands, used to presize buffers
    pub command_buffer_hint: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            auto_tick: true,
            delay_between_tasks_ms: None,
            command_buffer_hint: 64,
        }
    }
}

impl SchedulerConfig {
    /// Manual ticks, no inter-task delay
    pub fn testing() -> Self {
        Self {
            tick_interval_ms: 5,
            auto_tick: false,
            delay_between_tasks_ms: None,
            command_buffer_hint: 16,
        }
    }

    pub fn low_latency() -> Self {
        Self {
            tick_interval_ms: 10,
            ..Self::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn delay_between_tasks(&self) -> Option<Duration> {
        self.delay_between_tasks_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "scheduler.tick_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.tick_interval_ms > 1_000 {
            return Err(ConfigError::invalid(
                "scheduler.tick_interval_ms",
                "must not exceed 1000 ms",
            ));
        }
        if let Some(delay) = self.delay_between_tasks_ms {
            if delay > 60_000 {
                return Err(ConfigError::invalid(
                    "scheduler.delay_between_tasks_ms",
                    "must not exceed 60000 ms",
                ));
            }
        }
        if self.command_buffer_hint == 0 {
            return Err(ConfigError::invalid(
                "scheduler.command_buffer_hint",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Timeout Configuration
// ----------------------------------------------------------------------------

/// Timeout for one kind of task; `None` never times out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutOverride {
    pub kind: TaskKind,
    pub timeout_ms: Option<u64>,
}

/// Timeouts applied to tasks that do not declare their own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_timeout_ms: u64,
    /// Stack crash recovery can take far longer than any single operation
    pub crash_resolver_timeout_ms: u64,
    pub overrides: Vec<TimeoutOverride>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 12_500,
            crash_resolver_timeout_ms: 50_000,
            overrides: Vec::new(),
        }
    }
}

impl TimeoutConfig {
    pub fn testing() -> Self {
        Self {
            default_timeout_ms: 1_000,
            crash_resolver_timeout_ms: 2_000,
            overrides: Vec::new(),
        }
    }

    pub fn low_latency() -> Self {
        Self {
            default_timeout_ms: 8_000,
            ..Self::default()
        }
    }

    /// Override the timeout of one task kind
    pub fn with_override(mut self, kind: TaskKind, timeout: Option<Duration>) -> Self {
        self.overrides.retain(|entry| entry.kind != kind);
        self.overrides.push(TimeoutOverride {
            kind,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        });
        self
    }

    /// Timeout for a task of `kind` that uses the configured default
    pub fn timeout_for(&self, kind: TaskKind) -> Option<Duration> {
        if let Some(entry) = self.overrides.iter().find(|entry| entry.kind == kind) {
            return entry.timeout_ms.map(Duration::from_millis);
        }
        let millis = match kind {
            TaskKind::ResolveCrashes => self.crash_resolver_timeout_ms,
            _ => self.default_timeout_ms,
        };
        Some(Duration::from_millis(millis))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "timeouts.default_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.crash_resolver_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "timeouts.crash_resolver_timeout_ms",
                "must be greater than zero",
            ));
        }
        for (i, entry) in self.overrides.iter().enumerate() {
            if entry.timeout_ms == Some(0) {
                return Err(ConfigError::invalid(
                    format!("timeouts.overrides[{}]", i),
                    format!("timeout for {} must be greater than zero", entry.kind),
                ));
            }
            if self.overrides[..i].iter().any(|other| other.kind == entry.kind) {
                return Err(ConfigError::invalid(
                    format!("timeouts.overrides[{}]", i),
                    format!("duplicate override for {}", entry.kind),
                ));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a radio manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub scheduler: SchedulerConfig,
    pub timeouts: TimeoutConfig,
}

impl RadioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand-driven ticks and short timeouts
    pub fn testing() -> Self {
        Self {
            scheduler: SchedulerConfig::testing(),
            timeouts: TimeoutConfig::testing(),
        }
    }

    pub fn low_latency() -> Self {
        Self {
            scheduler: SchedulerConfig::low_latency(),
            timeouts: TimeoutConfig::low_latency(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.scheduler.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_auto_tick(mut self, auto_tick: bool) -> Self {
        self.scheduler.auto_tick = auto_tick;
        self
    }

    pub fn with_delay_between_tasks(mut self, delay: Option<Duration>) -> Self {
        self.scheduler.delay_between_tasks_ms = delay.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.timeouts.validate()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
