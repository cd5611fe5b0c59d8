//! Radio Link Core
//!
//! This crate provides the operation scheduler and state tracking for a
//! single-flight radio link, where only one asynchronous hardware operation
//! may be in flight at a time:
//! - `TaskQueue`: priority queue with preemption, soft cancellation, timeouts
//! - `StateTracker`: lock-free bitmask state per manager and per device
//! - `RadioAdapter`: the hardware boundary tasks dispatch through
//!
//! Nothing here spawns threads or touches a clock on its own. The owner
//! feeds the queue ticks and state transitions; `radiolink-runtime` provides
//! a ready-made single-owner worker.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod adapter;
pub mod config;
pub mod errors;
pub mod operations;
pub mod policy;
pub mod queue;
pub mod state;
pub mod task;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use adapter::{AdapterResult, RadioAdapter, StateSnapshot, StateView};
pub use config::{RadioConfig, SchedulerConfig, TimeoutConfig, TimeoutOverride};
pub use errors::{AdapterError, ConfigError, IdentifierError, RadioError, Result, SchedulerError};
pub use queue::{QueueStats, TaskCriteria, TaskQueue, TaskSnapshot};
pub use state::{
    DeviceState, Intent, ManagerState, StateEvent, StateFlag, StateMask, StateTracker,
    Transition, TransitionListener, STATUS_NOT_APPLICABLE,
};
pub use task::{
    Characteristic, ConnectionPriority, Gate, Operation, Payload, Resolved, Step, Task,
    TaskBuilder, TaskContext, TaskInfo, TaskKind, TaskOutcome, TaskPriority, TaskState, Timeout,
};
pub use types::{
    DeviceId, ManualTimeSource, ServerId, SystemTimeSource, Target, TaskId, TimeSource, Timestamp,
    TransactionId,
};

#[cfg(any(test, feature = "testing"))]
pub use adapter::{AdapterCall, MockAdapter};
