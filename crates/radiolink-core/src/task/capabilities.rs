//! Capability record
//!
//! A task is a value carrying the functions that describe how it behaves:
//! when it may run, what it yields to, how long it may take and what it
//! does. Pure predicates are plain function pointers over [`TaskInfo`];
//! hooks that drive the radio are boxed closures.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use super::TaskInfo;
use crate::adapter::{RadioAdapter, StateView};
use crate::errors::AdapterError;
use crate::policy;
use crate::state::StateEvent;
use crate::types::Target;

// ----------------------------------------------------------------------------
// Hook Results
// ----------------------------------------------------------------------------

/// What a hook reports back to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    /// Still in flight
    Continue,
    Succeed,
    Fail,
    FailImmediately,
    Redundant,
    /// Give up the radio and go back into the queue
    Interrupt,
}

/// Outcome of the executability check at arm time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    Ready,
    /// Could become ready on its own; leave the task queued
    NotYet,
    /// Cannot become ready without outside intervention; fail the task
    Never,
}

/// Timeout declared by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeout {
    /// Use the configured timeout for the task's kind
    #[default]
    Default,
    After(Duration),
    Infinite,
}

// ----------------------------------------------------------------------------
// Hook Context
// ----------------------------------------------------------------------------

/// Everything an execute or update hook may touch
pub struct TaskContext<'a> {
    pub info: &'a TaskInfo,
    pub adapter: &'a mut dyn RadioAdapter,
    pub state: &'a dyn StateView,
    /// Time spent executing so far
    pub elapsed: Duration,
}

pub type Precondition = fn(&TaskInfo, &dyn StateView) -> Gate;
pub type RedundancyCheck = fn(&TaskInfo, &dyn StateView) -> bool;
/// `(this, other)`: whether `this` yields to `other`
pub type Relation = fn(&TaskInfo, &TaskInfo) -> bool;
/// `(candidate, other, head)`: whether `candidate` goes ahead of `other`
pub type Importance = fn(&TaskInfo, &TaskInfo, Option<&Target>) -> bool;
pub type CompletionMatcher = fn(&TaskInfo, &StateEvent) -> Step;
pub type Hook = Box<dyn FnMut(&mut TaskContext<'_>) -> Result<Step, AdapterError> + Send>;
/// Winds down the hardware side of a task that stopped executing
pub type LeaveHook = fn(&TaskInfo, &mut dyn RadioAdapter) -> Result<(), AdapterError>;

// ----------------------------------------------------------------------------
// Capabilities
// ----------------------------------------------------------------------------

pub struct Capabilities {
    pub precondition: Precondition,
    pub redundant: RedundancyCheck,
    pub cancellable_by: Relation,
    pub softly_cancellable_by: Relation,
    pub interruptible_by: Relation,
    pub more_important_than: Importance,
    pub timeout: Timeout,
    /// The in-flight hardware operation can be abandoned outright
    pub abortable: bool,
    pub execute: Hook,
    /// Called on every tick while executing
    pub update: Option<Hook>,
    /// Matched against every tracker transition while executing
    pub completes_on: Option<CompletionMatcher>,
    /// Runs once the task leaves EXECUTING for any reason, interruption included
    pub on_leave: Option<LeaveHook>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            precondition: policy::default_precondition,
            redundant: policy::never_redundant,
            cancellable_by: policy::default_cancellable_by,
            softly_cancellable_by: policy::never,
            interruptible_by: policy::never,
            more_important_than: policy::default_more_important,
            timeout: Timeout::Default,
            abortable: false,
            execute: Box::new(|_| Ok(Step::Continue)),
            update: None,
            completes_on: None,
            on_leave: None,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("timeout", &self.timeout)
            .field("abortable", &self.abortable)
            .field("has_update", &self.update.is_some())
            .field("has_completion", &self.completes_on.is_some())
            .field("has_leave", &self.on_leave.is_some())
            .finish()
    }
}
