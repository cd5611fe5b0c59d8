//! Radio Worker
//!
//! The single owner of the task queue, the device registry and the platform
//! adapter. All of them are touched only from [`RadioWorker::process_command`]
//! and [`RadioWorker::tick`], so nothing here needs a lock beyond the atomics
//! inside each tracker.
//!
//! Tracker listeners and task listeners run on this worker context. They may
//! read any tracker through a [`crate::RadioHandle`] and may send further
//! commands; those commands are processed after the current one finishes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use radiolink_core::{
    DeviceId, DeviceState, ManagerState, RadioAdapter, RadioConfig, Resolved, SchedulerError,
    StateEvent, StateMask, StateTracker, StateView, Step, Target, Task, TaskCriteria,
    TaskOutcome, TaskQueue, TaskSnapshot, TimeSource, TransactionId, Transition,
};
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::command::{
    CallbackId, CommandReceiver, RuntimeStats, WorkerCallback, WorkerCommand,
};
use crate::error::RuntimeResult;
use crate::logging::{log_receive, CommandKind};

/// Device trackers shared between the worker and every handle
pub type DeviceRegistry = Arc<DashMap<DeviceId, Arc<StateTracker<DeviceState>>>>;

pub type DeviceTransitionListener = Arc<dyn Fn(DeviceId, &Transition<DeviceState>) + Send + Sync>;
pub type OutcomeObserver = Arc<dyn Fn(&TaskOutcome) + Send + Sync>;

// ----------------------------------------------------------------------------
// Worker Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub commands_processed: u64,
    pub transitions_observed: u64,
    pub callbacks_run: u64,
    pub outcomes_dispatched: u64,
}

// ----------------------------------------------------------------------------
// State View
// ----------------------------------------------------------------------------

/// Live view over the worker's trackers handed to tasks
struct WorkerView<'a> {
    manager: &'a StateTracker<ManagerState>,
    devices: &'a DashMap<DeviceId, Arc<StateTracker<DeviceState>>>,
    connections: &'a HashSet<DeviceId>,
}

impl StateView for WorkerView<'_> {
    fn manager_state(&self) -> StateMask<ManagerState> {
        self.manager.bits()
    }

    fn device_state(&self, device: DeviceId) -> Option<StateMask<DeviceState>> {
        self.devices.get(&device).map(|entry| entry.value().bits())
    }

    fn has_connection(&self, device: DeviceId) -> bool {
        self.connections.contains(&device)
    }
}

// ----------------------------------------------------------------------------
// Radio Worker
// ----------------------------------------------------------------------------

struct DelayedCallback {
    id: CallbackId,
    remaining: Duration,
    callback: WorkerCallback,
}

/// Everything the builder hands over when constructing a worker
pub(crate) struct WorkerParts {
    pub config: RadioConfig,
    pub manager: Arc<StateTracker<ManagerState>>,
    pub devices: DeviceRegistry,
    pub adapter: Box<dyn RadioAdapter>,
    pub receiver: CommandReceiver,
    pub device_listener: Option<DeviceTransitionListener>,
    pub outcome_observer: Option<OutcomeObserver>,
    pub time_source: Arc<dyn TimeSource>,
}

pub struct RadioWorker {
    config: RadioConfig,
    queue: TaskQueue,
    manager: Arc<StateTracker<ManagerState>>,
    devices: DeviceRegistry,
    connections: HashSet<DeviceId>,
    adapter: Box<dyn RadioAdapter>,
    receiver: CommandReceiver,
    delayed: Vec<DelayedCallback>,
    device_listener: Option<DeviceTransitionListener>,
    outcome_observer: Option<OutcomeObserver>,
    time_source: Arc<dyn TimeSource>,
    stats: WorkerStats,
    running: bool,
}

impl RadioWorker {
    pub(crate) fn new(parts: WorkerParts) -> Self {
        Self {
            queue: TaskQueue::from_config(&parts.config),
            delayed: Vec::with_capacity(parts.config.scheduler.command_buffer_hint),
            config: parts.config,
            manager: parts.manager,
            devices: parts.devices,
            connections: HashSet::new(),
            adapter: parts.adapter,
            receiver: parts.receiver,
            device_listener: parts.device_listener,
            outcome_observer: parts.outcome_observer,
            time_source: parts.time_source,
            stats: WorkerStats::default(),
            running: true,
        }
    }

    /// Main loop: process commands in arrival order and, when enabled,
    /// drive the queue from an internal ticker
    pub async fn run(mut self) -> RuntimeResult<()> {
        let auto_tick = self.config.scheduler.auto_tick;
        let period = self.config.scheduler.tick_interval();
        info!(?period, auto_tick, "Radio worker starting");

        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        while self.running {
            tokio::select! {
                command = self.receiver.recv() => {
                    match command {
                        Some(command) => self.process_command(command),
                        None => {
                            info!("All radio handles dropped, stopping worker");
                            self.running = false;
                        }
                    }
                }

                now = ticker.tick(), if auto_tick => {
                    let elapsed = now.saturating_duration_since(last_tick);
                    last_tick = now;
                    self.tick(elapsed);
                }
            }
        }

        // every listener still waiting hears back before the worker exits
        let resolved = self.queue.clear_all();
        self.dispatch(resolved);
        self.advance();
        self.delayed.clear();

        info!(stats = ?self.stats, "Radio worker stopped");
        Ok(())
    }

    pub fn process_command(&mut self, command: WorkerCommand) {
        self.stats.commands_processed += 1;
        log_receive(&command);

        let was_busy = self.queue.current().is_some();
        let reorders = CommandKind::from(&command).reorders_queue();
        match command {
            WorkerCommand::Submit { task, reply } => {
                let result = self.submit(task);
                if let Err(err) = &result {
                    debug!(error = %err, "Rejected task submission");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            WorkerCommand::Cancel { criteria } => self.cancel(&criteria),
            WorkerCommand::ClearQueueOf { target } => self.clear_queue_of(target),
            WorkerCommand::ClearAll => self.clear_all(),
            WorkerCommand::Interrupt { criteria, reply } => {
                let _ = reply.send(self.interrupt(&criteria));
            }
            WorkerCommand::Complete { criteria, step } => self.complete(&criteria, step),
            WorkerCommand::EndTransaction { transaction } => self.end_transaction(transaction),
            WorkerCommand::Find { criteria, reply } => {
                let _ = reply.send(self.queue.find(&criteria).map(TaskSnapshot::from));
            }
            WorkerCommand::Snapshot { reply } => {
                let _ = reply.send(self.queue.snapshot());
            }
            WorkerCommand::Stats { reply } => {
                let _ = reply.send(self.runtime_stats());
            }
            WorkerCommand::ManagerStateObserved {
                bits,
                intent,
                status,
            } => {
                self.report_manager_state(bits, intent, status);
            }
            WorkerCommand::DeviceStateObserved {
                device,
                bits,
                intent,
                status,
            } => {
                self.report_device_state(device, bits, intent, status);
            }
            WorkerCommand::ConnectionHandle { device, present } => {
                self.set_connection_handle(device, present)
            }
            WorkerCommand::Post { callback } => self.run_callback(callback),
            WorkerCommand::PostDelayed {
                id,
                delay,
                callback,
            } => self.post_delayed(id, delay, callback),
            WorkerCommand::RemoveCallback { id } => {
                self.remove_callback(id);
            }
            WorkerCommand::Tick { elapsed, reply } => {
                self.tick(elapsed);
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            WorkerCommand::Shutdown => {
                info!("Shutdown requested");
                self.running = false;
            }
        }

        // a task taken off the radio is replaced in the same step
        if reorders && was_busy && self.queue.current().is_none() {
            self.advance();
        }
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    pub fn submit(&mut self, task: Task) -> Result<(), SchedulerError> {
        let resolved = self.queue.submit(task)?;
        self.dispatch(resolved);
        Ok(())
    }

    pub fn cancel(&mut self, criteria: &TaskCriteria) {
        let resolved = self.queue.cancel(criteria);
        self.dispatch(resolved);
    }

    pub fn clear_queue_of(&mut self, target: Target) {
        let resolved = self.queue.clear_queue_of(target);
        self.dispatch(resolved);
    }

    pub fn clear_all(&mut self) {
        let resolved = self.queue.clear_all();
        self.dispatch(resolved);
    }

    pub fn interrupt(&mut self, criteria: &TaskCriteria) -> bool {
        self.queue.interrupt(criteria)
    }

    pub fn complete(&mut self, criteria: &TaskCriteria, step: Step) {
        let (queue, adapter, view) = self.split();
        let resolved = queue.complete(criteria, step, adapter, &view);
        self.dispatch(resolved);
    }

    /// Release the radio for transaction `transaction`
    pub fn end_transaction(&mut self, transaction: TransactionId) {
        let (queue, adapter, view) = self.split();
        let resolved = queue.end_transaction(transaction, adapter, &view);
        self.dispatch(resolved);
    }

    /// Wind down tasks taken off the radio and arm the next one
    ///
    /// Submissions and cancellations leave the hardware alone; the command
    /// loop calls this once such a command has emptied the radio.
    pub fn advance(&mut self) {
        let (queue, adapter, view) = self.split();
        let resolved = queue.advance(adapter, &view);
        self.dispatch(resolved);
    }

    /// Run due delayed callbacks, then advance the queue
    pub fn tick(&mut self, elapsed: Duration) {
        self.run_due_callbacks(elapsed);
        let (queue, adapter, view) = self.split();
        let resolved = queue.tick(elapsed, adapter, &view);
        self.dispatch(resolved);
    }

    // ------------------------------------------------------------------------
    // State Reports
    // ------------------------------------------------------------------------

    pub fn report_manager_state(
        &mut self,
        bits: StateMask<ManagerState>,
        intent: StateMask<ManagerState>,
        status: i32,
    ) -> Option<Transition<ManagerState>> {
        let transition = self.manager.update(bits, intent, status)?;
        self.stats.transitions_observed += 1;
        debug!(%transition, "Manager state changed");
        self.forward(StateEvent::Manager(transition));
        Some(transition)
    }

    pub fn report_device_state(
        &mut self,
        device: DeviceId,
        bits: StateMask<DeviceState>,
        intent: StateMask<DeviceState>,
        status: i32,
    ) -> Option<Transition<DeviceState>> {
        let tracker = self.device_tracker(device);
        let transition = tracker.update(bits, intent, status)?;
        self.stats.transitions_observed += 1;
        debug!(%device, %transition, "Device state changed");

        // a dropped link takes its handle with it
        if transition.entered(DeviceState::Disconnected) {
            self.connections.remove(&device);
        }
        self.forward(StateEvent::Device(device, transition));
        Some(transition)
    }

    pub fn set_connection_handle(&mut self, device: DeviceId, present: bool) {
        let changed = if present {
            self.connections.insert(device)
        } else {
            self.connections.remove(&device)
        };
        if changed {
            debug!(%device, present, "Connection handle changed");
        }
    }

    // ------------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------------

    /// Schedule `callback` to run once `delay` of tick time has passed
    pub fn post_delayed(&mut self, id: CallbackId, delay: Duration, callback: WorkerCallback) {
        if delay.is_zero() {
            self.run_callback(callback);
            return;
        }
        self.delayed.push(DelayedCallback {
            id,
            remaining: delay,
            callback,
        });
    }

    /// Returns `false` when the callback already ran or never existed
    pub fn remove_callback(&mut self, id: CallbackId) -> bool {
        let before = self.delayed.len();
        self.delayed.retain(|pending| pending.id != id);
        let removed = self.delayed.len() != before;
        if !removed {
            trace!(%id, "No pending callback to remove");
        }
        removed
    }

    pub fn pending_callbacks(&self) -> usize {
        self.delayed.len()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn runtime_stats(&self) -> RuntimeStats {
        RuntimeStats {
            queue: self.queue.stats().clone(),
            worker: self.stats.clone(),
        }
    }

    pub fn manager(&self) -> &StateTracker<ManagerState> {
        &self.manager
    }

    pub fn device(&self, device: DeviceId) -> Option<Arc<StateTracker<DeviceState>>> {
        self.devices.get(&device).map(|entry| entry.value().clone())
    }

    pub fn has_connection(&self, device: DeviceId) -> bool {
        self.connections.contains(&device)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the loop after the current command
    pub fn shutdown(&mut self) {
        self.running = false;
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn split(&mut self) -> (&mut TaskQueue, &mut dyn RadioAdapter, WorkerView<'_>) {
        let view = WorkerView {
            manager: &self.manager,
            devices: &self.devices,
            connections: &self.connections,
        };
        (&mut self.queue, self.adapter.as_mut(), view)
    }

    fn forward(&mut self, event: StateEvent) {
        let (queue, adapter, view) = self.split();
        let resolved = queue.on_transition(&event, adapter, &view);
        self.dispatch(resolved);
    }

    /// Existing tracker for `device`, or a new one in the discovered state
    fn device_tracker(&mut self, device: DeviceId) -> Arc<StateTracker<DeviceState>> {
        if let Some(existing) = self.device(device) {
            return existing;
        }

        let tracker = Arc::new(StateTracker::with_time_source(
            DeviceState::discovered_mask(),
            self.time_source.clone(),
        ));
        if let Some(listener) = &self.device_listener {
            let listener = listener.clone();
            tracker.set_listener(move |transition| listener(device, transition));
        }
        self.devices.insert(device, tracker.clone());
        debug!(%device, "Tracking new device");
        tracker
    }

    fn run_callback(&mut self, callback: WorkerCallback) {
        self.stats.callbacks_run += 1;
        callback(self);
    }

    fn run_due_callbacks(&mut self, elapsed: Duration) {
        if self.delayed.is_empty() {
            return;
        }

        let mut due = Vec::new();
        let mut index = 0;
        while index < self.delayed.len() {
            let pending = &mut self.delayed[index];
            pending.remaining = pending.remaining.saturating_sub(elapsed);
            if pending.remaining.is_zero() {
                due.push(self.delayed.remove(index));
            } else {
                index += 1;
            }
        }

        for pending in due {
            trace!(id = %pending.id, "Running delayed callback");
            self.run_callback(pending.callback);
        }
    }

    fn dispatch(&mut self, resolved: Vec<Resolved>) {
        for mut done in resolved {
            self.stats.outcomes_dispatched += 1;
            debug!(outcome = %done.outcome(), "Task resolved");
            done.notify();
            if let Some(observer) = &self.outcome_observer {
                observer(done.outcome());
            }
        }
    }
}
