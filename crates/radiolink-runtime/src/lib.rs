//! Radio Link Runtime
//!
//! Drives the `radiolink-core` scheduler from a single tokio task:
//! - `RadioWorker`: sole owner of the queue, trackers and adapter
//! - `RadioHandle`: cloneable command sender with lock-free tracker reads
//! - `RuntimeBuilder`: wires listeners and the adapter, spawns the worker
//!
//! Platform bindings report state changes and operation results through a
//! `RadioHandle`; the worker serializes them with task submissions and ticks.

pub mod builder;
pub mod command;
pub mod error;
pub mod handle;
pub mod logging;
pub mod worker;

pub use builder::{create_test_runtime, RuntimeBuilder, RuntimeHandle};
pub use command::{CallbackId, RuntimeStats, WorkerCallback, WorkerCommand};
pub use error::{RuntimeError, RuntimeResult};
pub use handle::RadioHandle;
pub use logging::CommandKind;
pub use worker::{DeviceRegistry, RadioWorker, WorkerStats};

// Re-export core types for convenience
pub use radiolink_core::{
    operations, DeviceId, DeviceState, Intent, ManagerState, RadioAdapter, RadioConfig, StateMask,
    Step, Target, Task, TaskCriteria, TaskId, TaskKind, TaskOutcome, TaskPriority, TaskSnapshot,
    TaskState, TransactionId, STATUS_NOT_APPLICABLE,
};
