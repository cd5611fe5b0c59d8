//! Command classification for structured logs
//!
//! Commands carry closures and reply channels that make poor log fields,
//! so the worker logs a short [`CommandKind`] label instead.

use core::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::command::WorkerCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Submit,
    Cancel,
    ClearQueueOf,
    ClearAll,
    Interrupt,
    Complete,
    EndTransaction,
    Find,
    Snapshot,
    Stats,
    ManagerStateObserved,
    DeviceStateObserved,
    ConnectionHandle,
    Post,
    PostDelayed,
    RemoveCallback,
    Tick,
    Shutdown,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Submit => "Submit",
            CommandKind::Cancel => "Cancel",
            CommandKind::ClearQueueOf => "ClearQueueOf",
            CommandKind::ClearAll => "ClearAll",
            CommandKind::Interrupt => "Interrupt",
            CommandKind::Complete => "Complete",
            CommandKind::EndTransaction => "EndTransaction",
            CommandKind::Find => "Find",
            CommandKind::Snapshot => "Snapshot",
            CommandKind::Stats => "Stats",
            CommandKind::ManagerStateObserved => "ManagerStateObserved",
            CommandKind::DeviceStateObserved => "DeviceStateObserved",
            CommandKind::ConnectionHandle => "ConnectionHandle",
            CommandKind::Post => "Post",
            CommandKind::PostDelayed => "PostDelayed",
            CommandKind::RemoveCallback => "RemoveCallback",
            CommandKind::Tick => "Tick",
            CommandKind::Shutdown => "Shutdown",
        }
    }

    /// Ticks arrive every few milliseconds and would drown everything else
    pub fn is_periodic(self) -> bool {
        matches!(self, CommandKind::Tick)
    }

    /// Commands that can take the executing task off the radio without
    /// touching the hardware
    pub fn reorders_queue(self) -> bool {
        matches!(
            self,
            CommandKind::Submit
                | CommandKind::Cancel
                | CommandKind::ClearQueueOf
                | CommandKind::ClearAll
                | CommandKind::Interrupt
                | CommandKind::Post
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerCommand::{}", self.name())
    }
}

impl From<&WorkerCommand> for CommandKind {
    fn from(command: &WorkerCommand) -> Self {
        match command {
            WorkerCommand::Submit { .. } => CommandKind::Submit,
            WorkerCommand::Cancel { .. } => CommandKind::Cancel,
            WorkerCommand::ClearQueueOf { .. } => CommandKind::ClearQueueOf,
            WorkerCommand::ClearAll => CommandKind::ClearAll,
            WorkerCommand::Interrupt { .. } => CommandKind::Interrupt,
            WorkerCommand::Complete { .. } => CommandKind::Complete,
            WorkerCommand::EndTransaction { .. } => CommandKind::EndTransaction,
            WorkerCommand::Find { .. } => CommandKind::Find,
            WorkerCommand::Snapshot { .. } => CommandKind::Snapshot,
            WorkerCommand::Stats { .. } => CommandKind::Stats,
            WorkerCommand::ManagerStateObserved { .. } => CommandKind::ManagerStateObserved,
            WorkerCommand::DeviceStateObserved { .. } => CommandKind::DeviceStateObserved,
            WorkerCommand::ConnectionHandle { .. } => CommandKind::ConnectionHandle,
            WorkerCommand::Post { .. } => CommandKind::Post,
            WorkerCommand::PostDelayed { .. } => CommandKind::PostDelayed,
            WorkerCommand::RemoveCallback { .. } => CommandKind::RemoveCallback,
            WorkerCommand::Tick { .. } => CommandKind::Tick,
            WorkerCommand::Shutdown => CommandKind::Shutdown,
        }
    }
}

/// Log a command as the worker takes it off the channel
pub fn log_receive(command: &WorkerCommand) {
    let kind = CommandKind::from(command);
    if !kind.is_periodic() {
        trace!(command = %kind, "Worker received command");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiolink_core::{TaskCriteria, TaskKind};

    #[test]
    fn test_command_classification() {
        let cancel = WorkerCommand::Cancel {
            criteria: TaskCriteria::kind(TaskKind::Connect),
        };
        assert_eq!(CommandKind::from(&cancel), CommandKind::Cancel);
        assert_eq!(CommandKind::Shutdown.to_string(), "WorkerCommand::Shutdown");
        assert!(CommandKind::Tick.is_periodic());
        assert!(!CommandKind::Submit.is_periodic());
        assert!(CommandKind::Interrupt.reorders_queue());
        assert!(!CommandKind::Complete.reorders_queue());
    }
}
