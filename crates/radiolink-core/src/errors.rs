//! Error types for radiolink core
//!
//! Expected operational failures (radio off, timeouts, preemption) are never
//! errors here; they are task ending states delivered to listeners. The types
//! below cover programmer errors, adapter dispatch failures, invalid
//! configuration and malformed identifiers.

use crate::task::TaskState;
use crate::types::{DeviceId, TaskId};

// ----------------------------------------------------------------------------
// Scheduler Errors
// ----------------------------------------------------------------------------

/// Contract violations detected by the task queue
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Task {task_id} is already tracked by this queue")]
    DuplicateTask { task_id: TaskId },

    #[error("Task {task_id} was already submitted (state {state})")]
    AlreadySubmitted { task_id: TaskId, state: TaskState },
}

// ----------------------------------------------------------------------------
// Adapter Errors
// ----------------------------------------------------------------------------

/// Failure to hand an operation to the hardware boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("Radio unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("No live connection to {device}")]
    NotConnected { device: DeviceId },

    #[error("{operation} rejected by the stack: {reason}")]
    Rejected { operation: String, reason: String },

    #[error("{operation} is not supported by this adapter")]
    Unsupported { operation: String },
}

impl AdapterError {
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Identifier Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid device address {input:?}: {reason}")]
    InvalidDeviceId { input: String, reason: String },
}

impl IdentifierError {
    pub fn invalid_device_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDeviceId {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Any error surfaced by radiolink core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),
}

pub type Result<T> = core::result::Result<T, RadioError>;
