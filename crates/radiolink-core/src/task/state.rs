//! Task lifecycle states

use core::fmt;

use serde::{Deserialize, Serialize};

/// Where a task is in its lifecycle
///
/// Whether a state ends the task is answered by [`TaskState::is_terminal`],
/// never by comparing declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Queued,
    Armed,
    Executing,
    /// Bumped off the radio by a more urgent task
    Interrupted,
    /// Back in the queue after an interruption
    Requeued,

    Succeeded,
    TimedOut,
    Failed,
    /// Could not even be dispatched to the hardware boundary
    FailedImmediately,
    Cancelled,
    /// Hardware operation finished but its success was suppressed
    SoftlyCancelled,
    /// Goal already satisfied when the task was armed
    Redundant,
    ClearedFromQueue,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        match self {
            TaskState::Created
            | TaskState::Queued
            | TaskState::Armed
            | TaskState::Executing
            | TaskState::Interrupted
            | TaskState::Requeued => false,
            TaskState::Succeeded
            | TaskState::TimedOut
            | TaskState::Failed
            | TaskState::FailedImmediately
            | TaskState::Cancelled
            | TaskState::SoftlyCancelled
            | TaskState::Redundant
            | TaskState::ClearedFromQueue => true,
        }
    }

    /// Ending states after which the next task is armed in the same step
    pub fn can_go_to_next_task_immediately(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::TimedOut)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TaskState::Failed | TaskState::FailedImmediately | TaskState::TimedOut
        )
    }

    /// Waiting in the queue, possibly after an interruption
    pub fn is_queued(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Requeued)
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskState::Created => "CREATED",
            TaskState::Queued => "QUEUED",
            TaskState::Armed => "ARMED",
            TaskState::Executing => "EXECUTING",
            TaskState::Interrupted => "INTERRUPTED",
            TaskState::Requeued => "REQUEUED",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::TimedOut => "TIMED_OUT",
            TaskState::Failed => "FAILED",
            TaskState::FailedImmediately => "FAILED_IMMEDIATELY",
            TaskState::Cancelled => "CANCELLED",
            TaskState::SoftlyCancelled => "SOFTLY_CANCELLED",
            TaskState::Redundant => "REDUNDANT",
            TaskState::ClearedFromQueue => "CLEARED_FROM_QUEUE",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
