//! Worker command channel
//!
//! Every entry point into the worker is a [`WorkerCommand`] sent over one
//! unbounded channel, so submissions, hardware callbacks, state reports and
//! ticks are serialized in arrival order. Requests that need an answer
//! carry a oneshot reply sender.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use radiolink_core::{
    DeviceId, DeviceState, ManagerState, QueueStats, SchedulerError, StateMask, Step, Target,
    Task, TaskCriteria, TaskSnapshot, TransactionId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::worker::{RadioWorker, WorkerStats};

pub type CommandSender = mpsc::UnboundedSender<WorkerCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<WorkerCommand>;

/// Work to run on the worker context with full access to it
pub type WorkerCallback = Box<dyn FnOnce(&mut RadioWorker) + Send>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Callback Ids
// ----------------------------------------------------------------------------

/// Identifies a delayed callback so it can be removed before it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackId(pub(crate) u64);

impl CallbackId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}", self.0)
    }
}

/// Allocates callback ids; shared by every clone of a handle
#[derive(Debug, Default)]
pub struct CallbackIds(AtomicU64);

impl CallbackIds {
    pub fn next(&self) -> CallbackId {
        CallbackId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Counters from both the queue and the worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub queue: QueueStats,
    pub worker: WorkerStats,
}

pub enum WorkerCommand {
    Submit {
        task: Task,
        reply: Option<oneshot::Sender<Result<(), SchedulerError>>>,
    },
    Cancel {
        criteria: TaskCriteria,
    },
    ClearQueueOf {
        target: Target,
    },
    ClearAll,
    Interrupt {
        criteria: TaskCriteria,
        reply: oneshot::Sender<bool>,
    },
    /// Outcome reported by the hardware binding for the executing task
    Complete {
        criteria: TaskCriteria,
        step: Step,
    },
    /// Release the lock held for a finished transaction
    EndTransaction {
        transaction: TransactionId,
    },
    Find {
        criteria: TaskCriteria,
        reply: oneshot::Sender<Option<TaskSnapshot>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Stats {
        reply: oneshot::Sender<RuntimeStats>,
    },
    ManagerStateObserved {
        bits: StateMask<ManagerState>,
        intent: StateMask<ManagerState>,
        status: i32,
    },
    DeviceStateObserved {
        device: DeviceId,
        bits: StateMask<DeviceState>,
        intent: StateMask<DeviceState>,
        status: i32,
    },
    ConnectionHandle {
        device: DeviceId,
        present: bool,
    },
    Post {
        callback: WorkerCallback,
    },
    PostDelayed {
        id: CallbackId,
        delay: Duration,
        callback: WorkerCallback,
    },
    RemoveCallback {
        id: CallbackId,
    },
    Tick {
        elapsed: Duration,
        reply: Option<oneshot::Sender<()>>,
    },
    Shutdown,
}

impl fmt::Debug for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerCommand::Submit { task, .. } => f.debug_struct("Submit").field("task", task).finish(),
            WorkerCommand::Cancel { criteria } => {
                f.debug_struct("Cancel").field("criteria", criteria).finish()
            }
            WorkerCommand::ClearQueueOf { target } => {
                f.debug_struct("ClearQueueOf").field("target", target).finish()
            }
            WorkerCommand::Complete { criteria, step } => f
                .debug_struct("Complete")
                .field("criteria", criteria)
                .field("step", step)
                .finish(),
            WorkerCommand::DeviceStateObserved { device, bits, .. } => f
                .debug_struct("DeviceStateObserved")
                .field("device", device)
                .field("bits", bits)
                .finish(),
            WorkerCommand::ManagerStateObserved { bits, .. } => f
                .debug_struct("ManagerStateObserved")
                .field("bits", bits)
                .finish(),
            WorkerCommand::PostDelayed { id, delay, .. } => f
                .debug_struct("PostDelayed")
                .field("id", id)
                .field("delay", delay)
                .finish(),
            WorkerCommand::Tick { elapsed, .. } => {
                f.debug_struct("Tick").field("elapsed", elapsed).finish()
            }
            other => write!(f, "{}", crate::logging::CommandKind::from(other)),
        }
    }
}
