//! Task queue and scheduler
//!
//! [`TaskQueue`] owns every pending task plus the single executing one. It
//! is a plain synchronous state machine: the owner calls it from one
//! context, feeds it ticks, completions and tracker transitions, and
//! notifies the [`Resolved`] tasks each call returns once the call is over.

use core::fmt;
use core::time::Duration;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::adapter::{RadioAdapter, StateView};
use crate::config::{RadioConfig, TimeoutConfig};
use crate::errors::{AdapterError, SchedulerError};
use crate::policy::insertion_index;
use crate::state::StateEvent;
use crate::task::{Gate, LeaveHook, Resolved, Step, Task, TaskInfo, TaskKind, TaskState};
use crate::types::{TaskId, Target, TransactionId};

// ----------------------------------------------------------------------------
// Criteria
// ----------------------------------------------------------------------------

/// Selects tasks by id, kind and target; unset fields match anything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCriteria {
    pub id: Option<TaskId>,
    pub kind: Option<TaskKind>,
    pub target: Option<Target>,
}

impl TaskCriteria {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn id(id: TaskId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn kind(kind: TaskKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn target(target: Target) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// Narrow to one target
    pub fn on(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn matches(&self, info: &TaskInfo) -> bool {
        self.id.map_or(true, |id| id == info.id)
            && self.kind.map_or(true, |kind| kind == info.kind())
            && self.target.map_or(true, |target| target == info.target)
    }
}

impl From<TaskKind> for TaskCriteria {
    fn from(kind: TaskKind) -> Self {
        Self::kind(kind)
    }
}

impl From<TaskId> for TaskCriteria {
    fn from(id: TaskId) -> Self {
        Self::id(id)
    }
}

// ----------------------------------------------------------------------------
// Snapshots and Statistics
// ----------------------------------------------------------------------------

/// Read-only copy of a task's observable state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub info: TaskInfo,
    pub state: TaskState,
    pub elapsed: Duration,
    pub soft_cancelled: bool,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            info: task.info().clone(),
            state: task.state(),
            elapsed: task.elapsed(),
            soft_cancelled: task.is_soft_cancelled(),
        }
    }
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.info, self.state)
    }
}

/// Counters kept by the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub armed: u64,
    pub interrupted: u64,
    pub ticks: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub failed_immediately: u64,
    pub cancelled: u64,
    pub softly_cancelled: u64,
    pub redundant: u64,
    pub cleared_from_queue: u64,
}

impl QueueStats {
    fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Succeeded => self.succeeded += 1,
            TaskState::TimedOut => self.timed_out += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::FailedImmediately => self.failed_immediately += 1,
            TaskState::Cancelled => self.cancelled += 1,
            TaskState::SoftlyCancelled => self.softly_cancelled += 1,
            TaskState::Redundant => self.redundant += 1,
            TaskState::ClearedFromQueue => self.cleared_from_queue += 1,
            _ => {}
        }
    }

    /// Tasks that reached any ending state
    pub fn resolved(&self) -> u64 {
        self.succeeded
            + self.timed_out
            + self.failed
            + self.failed_immediately
            + self.cancelled
            + self.softly_cancelled
            + self.redundant
            + self.cleared_from_queue
    }
}

// ----------------------------------------------------------------------------
// Task Queue
// ----------------------------------------------------------------------------

/// Priority queue with at most one executing task
///
/// Calls that take no adapter (`submit`, `cancel`, `clear_all`,
/// `interrupt`) can stop the executing task. Its leave hook then runs, and
/// the next task is armed, on the following call that has the adapter:
/// [`TaskQueue::advance`], `tick`, `complete` or `on_transition`. No new
/// task is armed before the hooks of the previous one have run.
pub struct TaskQueue {
    queue: VecDeque<Task>,
    current: Option<Task>,
    /// Leave hooks of tasks that stopped executing, not yet run
    leaving: Vec<(TaskInfo, LeaveHook)>,
    timeouts: TimeoutConfig,
    delay_between_tasks: Option<Duration>,
    /// Idle time since the last executing task ended; `None` before the first
    since_last_ended: Option<Duration>,
    stats: QueueStats,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(TimeoutConfig::default(), None)
    }
}

impl TaskQueue {
    pub fn new(timeouts: TimeoutConfig, delay_between_tasks: Option<Duration>) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            leaving: Vec::new(),
            timeouts,
            delay_between_tasks,
            since_last_ended: None,
            stats: QueueStats::default(),
        }
    }

    pub fn from_config(config: &RadioConfig) -> Self {
        Self::new(
            config.timeouts.clone(),
            config.scheduler.delay_between_tasks(),
        )
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Add a task
    ///
    /// Queued and executing tasks that are softly cancellable by the new
    /// task are flagged. If the executing task is cancellable by it, the
    /// executing task ends CANCELLED (or is softly cancelled when its
    /// operation cannot be aborted) and the new task goes to the front. If
    /// the executing task is interruptible by it, the new task goes to the
    /// front with the interrupted task right behind. Otherwise the
    /// insertion index comes from the ordering policy.
    pub fn submit(&mut self, mut task: Task) -> Result<Vec<Resolved>, SchedulerError> {
        if task.state() != TaskState::Created {
            return Err(SchedulerError::AlreadySubmitted {
                task_id: task.id(),
                state: task.state(),
            });
        }
        if self.contains(task.id()) {
            return Err(SchedulerError::DuplicateTask { task_id: task.id() });
        }

        self.stats.submitted += 1;
        task.set_state(TaskState::Queued);
        debug!(task = %task.info(), "Task submitted");

        for queued in self.queue.iter_mut() {
            if queued.is_softly_cancellable_by(&task) {
                debug!(task = %queued.info(), by = %task.info(), "Queued task softly cancelled");
                queued.soft_cancel();
            }
        }

        let mut resolved = Vec::new();
        let Some(mut current) = self.current.take() else {
            self.insert_by_priority(task, None);
            return Ok(resolved);
        };

        if current.is_softly_cancellable_by(&task) {
            debug!(task = %current.info(), by = %task.info(), "Executing task softly cancelled");
            current.soft_cancel();
        }

        if current.is_cancellable_by(&task) {
            if current.capabilities().abortable {
                debug!(task = %current.info(), by = %task.info(), "Executing task cancelled");
                self.current = Some(current);
                self.end_current(TaskState::Cancelled, &mut resolved);
            } else {
                debug!(task = %current.info(), by = %task.info(), "Executing task cannot abort, softly cancelled");
                current.soft_cancel();
                self.current = Some(current);
            }
            self.queue.push_front(task);
        } else if current.is_interruptible_by(&task) {
            debug!(task = %current.info(), by = %task.info(), "Executing task interrupted");
            let interrupted = self.suspend(current);
            self.queue.push_front(interrupted);
            self.queue.push_front(task);
        } else {
            let head = current.target();
            self.current = Some(current);
            self.insert_by_priority(task, Some(&head));
        }

        Ok(resolved)
    }

    fn insert_by_priority(&mut self, task: Task, head: Option<&Target>) {
        let index = insertion_index(&task, &self.queue, head);
        trace!(task = %task.info(), index, "Inserting task");
        self.queue.insert(index, task);
    }

    // ------------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------------

    /// Run pending leave hooks, then arm the next task if nothing executes
    ///
    /// The owner calls this after a submission or cancellation to put the
    /// radio back to work without waiting for the next tick.
    pub fn advance(
        &mut self,
        adapter: &mut dyn RadioAdapter,
        state: &dyn StateView,
    ) -> Vec<Resolved> {
        let mut resolved = Vec::new();
        self.arm_next(adapter, state, &mut resolved);
        resolved
    }

    /// Advance time by `elapsed`
    ///
    /// With nothing executing, arms the first runnable task. Otherwise adds
    /// `elapsed` to the executing task, resolves it TIMED_OUT past its
    /// timeout, and runs its update hook.
    pub fn tick(
        &mut self,
        elapsed: Duration,
        adapter: &mut dyn RadioAdapter,
        state: &dyn StateView,
    ) -> Vec<Resolved> {
        self.stats.ticks += 1;
        let mut resolved = Vec::new();

        let advance = match self.current.as_mut() {
            None => {
                if let Some(idle) = self.since_last_ended.as_mut() {
                    *idle = idle.saturating_add(elapsed);
                }
                true
            }
            Some(current) => {
                current.add_elapsed(elapsed);
                if current.has_timed_out() {
                    warn!(task = %current.info(), elapsed = ?current.elapsed(), "Task timed out");
                    self.end_current(TaskState::TimedOut, &mut resolved)
                } else {
                    let step = current.run_update(adapter, state);
                    self.settle(step, TaskState::Failed, &mut resolved)
                }
            }
        };

        self.release(adapter);
        if advance {
            self.arm_next(adapter, state, &mut resolved);
        }
        resolved
    }

    /// Report the outcome of the executing task if it matches `criteria`
    pub fn complete(
        &mut self,
        criteria: &TaskCriteria,
        step: Step,
        adapter: &mut dyn RadioAdapter,
        state: &dyn StateView,
    ) -> Vec<Resolved> {
        let mut resolved = Vec::new();
        let matches = self
            .current
            .as_ref()
            .map_or(false, |current| criteria.matches(current.info()));
        if !matches {
            trace!(?criteria, ?step, "Completion matched no executing task");
            return resolved;
        }

        let advance = self.settle(Ok(step), TaskState::Failed, &mut resolved);
        self.release(adapter);
        if advance {
            self.arm_next(adapter, state, &mut resolved);
        }
        resolved
    }

    /// Release the lock held for `transaction`
    ///
    /// An executing lock succeeds and the next task is armed; a queued one
    /// is cleared from the queue.
    pub fn end_transaction(
        &mut self,
        transaction: TransactionId,
        adapter: &mut dyn RadioAdapter,
        state: &dyn StateView,
    ) -> Vec<Resolved> {
        let is_lock = |info: &TaskInfo| {
            info.is(TaskKind::TransactionLock) && info.transaction == Some(transaction)
        };
        let held = self
            .current
            .as_ref()
            .map_or(false, |current| is_lock(current.info()));
        if !held {
            return self.remove_queued_where(is_lock);
        }

        let mut resolved = Vec::new();
        debug!(%transaction, "Transaction finished, releasing lock");
        let advance = self.settle(Ok(Step::Succeed), TaskState::Failed, &mut resolved);
        self.release(adapter);
        if advance {
            self.arm_next(adapter, state, &mut resolved);
        }
        resolved
    }

    /// Offer a tracker transition to the executing task
    pub fn on_transition(
        &mut self,
        event: &StateEvent,
        adapter: &mut dyn RadioAdapter,
        state: &dyn StateView,
    ) -> Vec<Resolved> {
        let mut resolved = Vec::new();
        let step = match self.current.as_ref() {
            Some(current) => current.match_event(event),
            None => return resolved,
        };

        let advance = self.settle(Ok(step), TaskState::Failed, &mut resolved);
        self.release(adapter);
        if advance {
            self.arm_next(adapter, state, &mut resolved);
        }
        resolved
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Cancel every task matching `criteria`
    pub fn cancel(&mut self, criteria: &TaskCriteria) -> Vec<Resolved> {
        self.cancel_where(|info| criteria.matches(info))
    }

    /// Cancel every task matching `predicate`
    ///
    /// Queued matches end CLEARED_FROM_QUEUE (SOFTLY_CANCELLED if flagged).
    /// An executing match ends CANCELLED when abortable and is softly
    /// cancelled otherwise.
    pub fn cancel_where<F>(&mut self, predicate: F) -> Vec<Resolved>
    where
        F: Fn(&TaskInfo) -> bool,
    {
        let mut resolved = self.remove_queued_where(&predicate);

        let abortable = match self.current.as_mut() {
            Some(current) if predicate(current.info()) => {
                if current.capabilities().abortable {
                    true
                } else {
                    debug!(task = %current.info(), "Executing task softly cancelled");
                    current.soft_cancel();
                    false
                }
            }
            _ => false,
        };
        if abortable {
            self.end_current(TaskState::Cancelled, &mut resolved);
        }
        resolved
    }

    /// Drop every queued task bound to `target`; the executing task is left alone
    pub fn clear_queue_of(&mut self, target: Target) -> Vec<Resolved> {
        self.remove_queued_where(|info| info.target == target)
    }

    /// Drop everything, cancelling the executing task outright
    pub fn clear_all(&mut self) -> Vec<Resolved> {
        let mut resolved = self.remove_queued_where(|_| true);
        self.end_current(TaskState::Cancelled, &mut resolved);
        resolved
    }

    /// Put the executing task back into the queue if it matches `criteria`
    pub fn interrupt(&mut self, criteria: &TaskCriteria) -> bool {
        let matches = self
            .current
            .as_ref()
            .map_or(false, |current| criteria.matches(current.info()));
        matches && self.requeue_current()
    }

    fn remove_queued_where<F>(&mut self, predicate: F) -> Vec<Resolved>
    where
        F: Fn(&TaskInfo) -> bool,
    {
        let mut resolved = Vec::new();
        let pending: Vec<Task> = self.queue.drain(..).collect();
        for task in pending {
            if predicate(task.info()) {
                let state = if task.is_soft_cancelled() {
                    TaskState::SoftlyCancelled
                } else {
                    TaskState::ClearedFromQueue
                };
                resolved.push(self.end_task(task, state));
            } else {
                self.queue.push_back(task);
            }
        }
        resolved
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// The executing task if it matches, else the first queued match
    pub fn find(&self, criteria: &TaskCriteria) -> Option<&Task> {
        self.current
            .iter()
            .chain(self.queue.iter())
            .find(|task| criteria.matches(task.info()))
    }

    /// Queue position of the first queued match; the executing task is not queued
    pub fn position_of(&self, criteria: &TaskCriteria) -> Option<usize> {
        self.queue
            .iter()
            .position(|task| criteria.matches(task.info()))
    }

    pub fn is_current(&self, criteria: &TaskCriteria) -> bool {
        self.current
            .as_ref()
            .map_or(false, |task| criteria.matches(task.info()))
    }

    pub fn is_queued(&self, criteria: &TaskCriteria) -> bool {
        self.position_of(criteria).is_some()
    }

    pub fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    /// Number of queued tasks, not counting the executing one
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// No task queued or executing
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    /// Executing task first, then the queue in order
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.current
            .iter()
            .chain(self.queue.iter())
            .map(TaskSnapshot::from)
            .collect()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    fn contains(&self, id: TaskId) -> bool {
        self.find(&TaskCriteria::id(id)).is_some()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn delay_passed(&self) -> bool {
        match (self.delay_between_tasks, self.since_last_ended) {
            (Some(delay), Some(idle)) => idle >= delay,
            _ => true,
        }
    }

    /// Run the leave hooks of tasks that stopped executing
    fn release(&mut self, adapter: &mut dyn RadioAdapter) {
        for (info, hook) in std::mem::take(&mut self.leaving) {
            trace!(task = %info, "Running leave hook");
            if let Err(err) = hook(&info, adapter) {
                warn!(task = %info, error = %err, "Leave hook failed");
            }
        }
    }

    fn mark_left(&mut self, task: &Task) {
        if let Some(hook) = task.leave_hook() {
            self.leaving.push((task.info().clone(), hook));
        }
    }

    /// Arm queued tasks until one is left executing or nothing can run
    fn arm_next(
        &mut self,
        adapter: &mut dyn RadioAdapter,
        state: &dyn StateView,
        resolved: &mut Vec<Resolved>,
    ) {
        self.release(adapter);
        while self.current.is_none() && self.delay_passed() {
            let Some(index) = self
                .queue
                .iter()
                .position(|task| task.is_soft_cancelled() || task.gate(state) != Gate::NotYet)
            else {
                return;
            };
            let Some(mut task) = self.queue.remove(index) else {
                return;
            };

            task.arm(&self.timeouts);
            self.stats.armed += 1;
            debug!(task = %task.info(), "Task armed");

            let verdict = if task.is_soft_cancelled() {
                Some(TaskState::SoftlyCancelled)
            } else if task.gate(state) == Gate::Never {
                warn!(task = %task.info(), "Task preconditions cannot be met");
                Some(TaskState::Failed)
            } else if task.is_redundant(state) {
                debug!(task = %task.info(), "Task already satisfied");
                Some(TaskState::Redundant)
            } else {
                None
            };

            let advance = match verdict {
                Some(ending) => {
                    self.current = Some(task);
                    self.end_current(ending, resolved)
                }
                None => {
                    let step = task.run_execute(adapter, state);
                    debug!(task = %task.info(), "Task executing");
                    self.current = Some(task);
                    let advance = self.settle(step, TaskState::FailedImmediately, resolved);
                    self.release(adapter);
                    advance
                }
            };
            if !advance {
                return;
            }
        }
    }

    /// Apply a hook result to the executing task
    ///
    /// Returns true when the task ended in a state that lets the next task
    /// be armed in the same step.
    fn settle(
        &mut self,
        step: Result<Step, AdapterError>,
        on_error: TaskState,
        resolved: &mut Vec<Resolved>,
    ) -> bool {
        let ending = match step {
            Ok(Step::Continue) => return false,
            Ok(Step::Interrupt) => {
                self.requeue_current();
                return false;
            }
            Ok(Step::Succeed) => TaskState::Succeeded,
            Ok(Step::Fail) => TaskState::Failed,
            Ok(Step::FailImmediately) => TaskState::FailedImmediately,
            Ok(Step::Redundant) => TaskState::Redundant,
            Err(err) => {
                if let Some(current) = self.current.as_ref() {
                    warn!(task = %current.info(), error = %err, "Adapter rejected operation");
                }
                on_error
            }
        };
        self.end_current(ending, resolved)
    }

    fn end_current(&mut self, ending: TaskState, resolved: &mut Vec<Resolved>) -> bool {
        let Some(task) = self.current.take() else {
            return false;
        };
        self.since_last_ended = Some(Duration::ZERO);
        self.mark_left(&task);
        let done = self.end_task(task, ending);
        let advance = done.outcome().state.can_go_to_next_task_immediately();
        resolved.push(done);
        advance
    }

    fn end_task(&mut self, task: Task, ending: TaskState) -> Resolved {
        let done = task.finish(ending);
        self.stats.record(done.outcome().state);
        debug!(outcome = %done.outcome(), "Task ended");
        done
    }

    fn requeue_current(&mut self) -> bool {
        let Some(task) = self.current.take() else {
            return false;
        };
        debug!(task = %task.info(), "Task interrupted, requeueing");
        let task = self.suspend(task);
        self.insert_by_priority(task, None);
        true
    }

    /// Take a task off the radio through INTERRUPTED, ready to be queued again
    fn suspend(&mut self, mut task: Task) -> Task {
        self.mark_left(&task);
        task.set_state(TaskState::Interrupted);
        self.stats.interrupted += 1;
        self.since_last_ended = Some(Duration::ZERO);
        task.set_state(TaskState::Requeued);
        task
    }
}

impl fmt::Display for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current {
            Some(current) => write!(f, "current: {}", current)?,
            None => f.write_str("current: (idle)")?,
        }
        f.write_str(" | queue: [")?;
        for (i, task) in self.queue.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", task)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("current", &self.current)
            .field("queue", &self.queue)
            .field("stats", &self.stats)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
