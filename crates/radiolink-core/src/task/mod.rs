//! Schedulable tasks
//!
//! A [`Task`] is one asynchronous radio operation: a [`TaskInfo`]
//! description, a [`Capabilities`] record and the lifecycle bookkeeping the
//! queue drives. Concrete operations are built in [`crate::operations`].

mod capabilities;
mod kind;
mod operation;
mod priority;
mod state;

pub use capabilities::{
    Capabilities, CompletionMatcher, Gate, Hook, Importance, LeaveHook, Precondition,
    RedundancyCheck, Relation, Step, TaskContext, Timeout,
};
pub use kind::TaskKind;
pub use operation::{Characteristic, ConnectionPriority, Operation, Payload, TaskInfo};
pub use priority::TaskPriority;
pub use state::TaskState;

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::StateView;
use crate::config::TimeoutConfig;
use crate::errors::AdapterError;
use crate::state::StateEvent;
use crate::types::{TaskId, Target, TransactionId};

pub type OutcomeListener = Box<dyn FnOnce(&TaskOutcome) + Send>;

// ----------------------------------------------------------------------------
// Outcome
// ----------------------------------------------------------------------------

/// What a task's listener receives when it reaches an ending state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub target: Target,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub state: TaskState,
    /// Time spent executing, zero for tasks that never ran
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Succeeded
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {} -> {} after {:?}",
            self.kind, self.id, self.target, self.state, self.elapsed
        )
    }
}

/// A task that left the queue in an ending state
///
/// Queue operations return these instead of invoking listeners themselves;
/// the caller runs [`Resolved::notify`] once it holds no scheduler borrow.
pub struct Resolved {
    outcome: TaskOutcome,
    task: Task,
}

impl Resolved {
    pub fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    /// Invoke the task's listener; later calls do nothing
    pub fn notify(&mut self) -> bool {
        match self.task.listener.take() {
            Some(listener) => {
                listener(&self.outcome);
                true
            }
            None => false,
        }
    }

    pub fn into_task(self) -> Task {
        self.task
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("outcome", &self.outcome)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Task
// ----------------------------------------------------------------------------

pub struct Task {
    info: TaskInfo,
    caps: Capabilities,
    state: TaskState,
    elapsed: Duration,
    timeout: Option<Duration>,
    soft_cancelled: bool,
    listener: Option<OutcomeListener>,
}

impl Task {
    pub fn builder(target: Target, operation: Operation) -> TaskBuilder {
        TaskBuilder::new(target, operation)
    }

    pub fn id(&self) -> TaskId {
        self.info.id
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }

    pub fn kind(&self) -> TaskKind {
        self.info.kind()
    }

    pub fn target(&self) -> Target {
        self.info.target
    }

    pub fn priority(&self) -> TaskPriority {
        self.info.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Timeout resolved when the task was armed
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn is_soft_cancelled(&self) -> bool {
        self.soft_cancelled
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.info.priority = priority;
        self
    }

    /// Make the task part of `transaction`
    pub fn in_transaction(mut self, transaction: TransactionId) -> Self {
        self.info.transaction = Some(transaction);
        self
    }

    /// Attach a one-shot result listener
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    // ------------------------------------------------------------------------
    // Policy queries
    // ------------------------------------------------------------------------

    pub fn is_cancellable_by(&self, other: &Task) -> bool {
        (self.caps.cancellable_by)(&self.info, &other.info)
    }

    pub fn is_softly_cancellable_by(&self, other: &Task) -> bool {
        (self.caps.softly_cancellable_by)(&self.info, &other.info)
    }

    pub fn is_interruptible_by(&self, other: &Task) -> bool {
        (self.caps.interruptible_by)(&self.info, &other.info)
    }

    pub fn is_more_important_than(&self, other: &Task, head: Option<&Target>) -> bool {
        (self.caps.more_important_than)(&self.info, &other.info, head)
    }

    pub fn gate(&self, state: &dyn StateView) -> Gate {
        (self.caps.precondition)(&self.info, state)
    }

    pub fn is_redundant(&self, state: &dyn StateView) -> bool {
        (self.caps.redundant)(&self.info, state)
    }

    // ------------------------------------------------------------------------
    // Lifecycle, driven by the queue
    // ------------------------------------------------------------------------

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    pub(crate) fn soft_cancel(&mut self) {
        self.soft_cancelled = true;
    }

    pub(crate) fn arm(&mut self, timeouts: &TimeoutConfig) {
        self.state = TaskState::Armed;
        self.elapsed = Duration::ZERO;
        self.timeout = match self.caps.timeout {
            Timeout::Default => timeouts.timeout_for(self.kind()),
            Timeout::After(duration) => Some(duration),
            Timeout::Infinite => None,
        };
    }

    pub(crate) fn add_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = self.elapsed.saturating_add(elapsed);
    }

    pub(crate) fn has_timed_out(&self) -> bool {
        matches!(self.timeout, Some(limit) if self.elapsed >= limit)
    }

    pub(crate) fn run_execute(
        &mut self,
        adapter: &mut dyn crate::adapter::RadioAdapter,
        state: &dyn StateView,
    ) -> Result<Step, AdapterError> {
        self.state = TaskState::Executing;
        let mut ctx = TaskContext {
            info: &self.info,
            adapter,
            state,
            elapsed: self.elapsed,
        };
        (self.caps.execute)(&mut ctx)
    }

    pub(crate) fn run_update(
        &mut self,
        adapter: &mut dyn crate::adapter::RadioAdapter,
        state: &dyn StateView,
    ) -> Result<Step, AdapterError> {
        let Some(update) = self.caps.update.as_mut() else {
            return Ok(Step::Continue);
        };
        let mut ctx = TaskContext {
            info: &self.info,
            adapter,
            state,
            elapsed: self.elapsed,
        };
        update(&mut ctx)
    }

    /// Hook to run when the task stops executing; `None` unless it is executing
    pub(crate) fn leave_hook(&self) -> Option<LeaveHook> {
        match self.state {
            TaskState::Executing => self.caps.on_leave,
            _ => None,
        }
    }

    pub(crate) fn match_event(&self, event: &StateEvent) -> Step {
        match self.caps.completes_on {
            Some(matcher) => matcher(&self.info, event),
            None => Step::Continue,
        }
    }

    /// Move to an ending state
    ///
    /// A softly cancelled task that would have succeeded ends
    /// SOFTLY_CANCELLED instead.
    pub(crate) fn finish(mut self, state: TaskState) -> Resolved {
        let state = if self.soft_cancelled && state == TaskState::Succeeded {
            TaskState::SoftlyCancelled
        } else {
            state
        };
        self.state = state;
        let outcome = TaskOutcome {
            id: self.info.id,
            target: self.info.target,
            kind: self.info.kind(),
            priority: self.info.priority,
            state,
            elapsed: self.elapsed,
        };
        Resolved {
            outcome,
            task: self,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("info", &self.info)
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .field("soft_cancelled", &self.soft_cancelled)
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.info, self.state)
    }
}

// ----------------------------------------------------------------------------
// Task Builder
// ----------------------------------------------------------------------------

/// Builder for tasks with a custom capability record
pub struct TaskBuilder {
    id: Option<TaskId>,
    target: Target,
    operation: Operation,
    priority: TaskPriority,
    transaction: Option<TransactionId>,
    caps: Capabilities,
    listener: Option<OutcomeListener>,
}

impl TaskBuilder {
    pub fn new(target: Target, operation: Operation) -> Self {
        Self {
            id: None,
            target,
            operation,
            priority: TaskPriority::Medium,
            transaction: None,
            caps: Capabilities::default(),
            listener: None,
        }
    }

    /// Use a caller-chosen id instead of a freshly allocated one
    pub fn id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn precondition(mut self, precondition: Precondition) -> Self {
        self.caps.precondition = precondition;
        self
    }

    pub fn redundant_when(mut self, check: RedundancyCheck) -> Self {
        self.caps.redundant = check;
        self
    }

    pub fn cancellable_by(mut self, relation: Relation) -> Self {
        self.caps.cancellable_by = relation;
        self
    }

    pub fn softly_cancellable_by(mut self, relation: Relation) -> Self {
        self.caps.softly_cancellable_by = relation;
        self
    }

    pub fn interruptible_by(mut self, relation: Relation) -> Self {
        self.caps.interruptible_by = relation;
        self
    }

    pub fn more_important_than(mut self, importance: Importance) -> Self {
        self.caps.more_important_than = importance;
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.caps.timeout = timeout;
        self
    }

    pub fn abortable(mut self, abortable: bool) -> Self {
        self.caps.abortable = abortable;
        self
    }

    pub fn execute<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut TaskContext<'_>) -> Result<Step, AdapterError> + Send + 'static,
    {
        self.caps.execute = Box::new(hook);
        self
    }

    pub fn on_update<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut TaskContext<'_>) -> Result<Step, AdapterError> + Send + 'static,
    {
        self.caps.update = Some(Box::new(hook));
        self
    }

    pub fn completes_on(mut self, matcher: CompletionMatcher) -> Self {
        self.caps.completes_on = Some(matcher);
        self
    }

    pub fn on_leave(mut self, hook: LeaveHook) -> Self {
        self.caps.on_leave = Some(hook);
        self
    }

    pub fn listener<F>(mut self, listener: F) -> Self
    where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn build(self) -> Task {
        Task {
            info: TaskInfo {
                id: self.id.unwrap_or_else(TaskId::next),
                target: self.target,
                priority: self.priority,
                transaction: self.transaction,
                operation: self.operation,
            },
            caps: self.caps,
            state: TaskState::Created,
            elapsed: Duration::ZERO,
            timeout: None,
            soft_cancelled: false,
            listener: self.listener,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
