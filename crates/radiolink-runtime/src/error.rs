//! Error types for the radio worker runtime

use radiolink_core::{ConfigError, RadioError, SchedulerError};

/// Errors surfaced by the runtime and its handles
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Worker channel closed: {message}")]
    ChannelClosed { message: String },

    #[error("Worker dropped the reply to {request}")]
    ReplyDropped { request: &'static str },

    #[error("Worker task failed: {message}")]
    Worker { message: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler rejected task: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Core(#[from] RadioError),
}

impl RuntimeError {
    pub fn channel_closed(message: impl Into<String>) -> Self {
        Self::ChannelClosed {
            message: message.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// The worker is gone; nothing sent to it will ever be processed
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. } | Self::Worker { .. })
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use radiolink_core::TaskId;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::from(SchedulerError::DuplicateTask {
            task_id: TaskId::from_raw(3),
        });
        assert!(err.to_string().starts_with("Scheduler rejected task"));
        assert!(!err.is_unrecoverable());
        assert!(RuntimeError::channel_closed("gone").is_unrecoverable());
    }
}
