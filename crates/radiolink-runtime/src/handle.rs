//! Radio Handle
//!
//! Cloneable entry point into a running worker. Mutations travel as
//! commands; tracker reads go straight to the shared trackers and never
//! wait on the worker.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use radiolink_core::{
    DeviceId, DeviceState, ManagerState, StateMask, StateTracker, Step, Target, Task,
    TaskCriteria, TaskId, TaskSnapshot, TransactionId,
};
use tokio::sync::oneshot;
use tracing::trace;

use crate::command::{CallbackId, CallbackIds, CommandSender, RuntimeStats, WorkerCommand};
use crate::error::{RuntimeError, RuntimeResult};
use crate::worker::{DeviceRegistry, RadioWorker};

#[derive(Clone)]
pub struct RadioHandle {
    sender: CommandSender,
    manager: Arc<StateTracker<ManagerState>>,
    devices: DeviceRegistry,
    callback_ids: Arc<CallbackIds>,
}

impl fmt::Debug for RadioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadioHandle")
            .field("manager", &self.manager.bits())
            .field("devices", &self.devices.len())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl RadioHandle {
    pub(crate) fn new(
        sender: CommandSender,
        manager: Arc<StateTracker<ManagerState>>,
        devices: DeviceRegistry,
    ) -> Self {
        Self {
            sender,
            manager,
            devices,
            callback_ids: Arc::new(CallbackIds::default()),
        }
    }

    fn send(&self, command: WorkerCommand) -> RuntimeResult<()> {
        self.sender
            .send(command)
            .map_err(|_| RuntimeError::channel_closed("radio worker is not running"))
    }

    async fn request<T>(
        &self,
        request: &'static str,
        command: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand,
    ) -> RuntimeResult<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response
            .await
            .map_err(|_| RuntimeError::ReplyDropped { request })
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Submit a task and wait until the worker has queued it
    pub async fn submit(&self, task: Task) -> RuntimeResult<TaskId> {
        let id = task.id();
        self.request("submit", |reply| WorkerCommand::Submit {
            task,
            reply: Some(reply),
        })
        .await??;
        Ok(id)
    }

    /// Submit without waiting; rejections are only logged by the worker
    pub fn enqueue(&self, task: Task) -> RuntimeResult<TaskId> {
        let id = task.id();
        self.send(WorkerCommand::Submit { task, reply: None })?;
        Ok(id)
    }

    pub fn cancel(&self, criteria: TaskCriteria) -> RuntimeResult<()> {
        self.send(WorkerCommand::Cancel { criteria })
    }

    pub fn clear_queue_of(&self, target: impl Into<Target>) -> RuntimeResult<()> {
        self.send(WorkerCommand::ClearQueueOf {
            target: target.into(),
        })
    }

    pub fn clear_all(&self) -> RuntimeResult<()> {
        self.send(WorkerCommand::ClearAll)
    }

    /// Interrupt the executing task if it matches; it is requeued
    pub async fn interrupt(&self, criteria: TaskCriteria) -> RuntimeResult<bool> {
        self.request("interrupt", |reply| WorkerCommand::Interrupt { criteria, reply })
            .await
    }

    /// Report the hardware result for the executing task
    pub fn complete(&self, criteria: TaskCriteria, step: Step) -> RuntimeResult<()> {
        self.send(WorkerCommand::Complete { criteria, step })
    }

    /// Let other work reach the device again once `transaction` is done
    pub fn end_transaction(&self, transaction: TransactionId) -> RuntimeResult<()> {
        self.send(WorkerCommand::EndTransaction { transaction })
    }

    pub fn succeed(&self, criteria: TaskCriteria) -> RuntimeResult<()> {
        self.complete(criteria, Step::Succeed)
    }

    pub fn fail(&self, criteria: TaskCriteria) -> RuntimeResult<()> {
        self.complete(criteria, Step::Fail)
    }

    pub async fn find(&self, criteria: TaskCriteria) -> RuntimeResult<Option<TaskSnapshot>> {
        self.request("find", |reply| WorkerCommand::Find { criteria, reply })
            .await
    }

    /// Executing task first, then the queue in order
    pub async fn snapshot(&self) -> RuntimeResult<Vec<TaskSnapshot>> {
        self.request("snapshot", |reply| WorkerCommand::Snapshot { reply })
            .await
    }

    pub async fn stats(&self) -> RuntimeResult<RuntimeStats> {
        self.request("stats", |reply| WorkerCommand::Stats { reply })
            .await
    }

    /// Advance the worker by `elapsed` and wait for the step to finish
    pub async fn tick(&self, elapsed: Duration) -> RuntimeResult<()> {
        self.request("tick", |reply| WorkerCommand::Tick {
            elapsed,
            reply: Some(reply),
        })
        .await
    }

    // ------------------------------------------------------------------------
    // State Reports
    // ------------------------------------------------------------------------

    pub fn report_manager_state(
        &self,
        bits: StateMask<ManagerState>,
        intent: impl Into<StateMask<ManagerState>>,
        status: i32,
    ) -> RuntimeResult<()> {
        self.send(WorkerCommand::ManagerStateObserved {
            bits,
            intent: intent.into(),
            status,
        })
    }

    pub fn report_device_state(
        &self,
        device: DeviceId,
        bits: StateMask<DeviceState>,
        intent: impl Into<StateMask<DeviceState>>,
        status: i32,
    ) -> RuntimeResult<()> {
        self.send(WorkerCommand::DeviceStateObserved {
            device,
            bits,
            intent: intent.into(),
            status,
        })
    }

    pub fn set_connection_handle(&self, device: DeviceId, present: bool) -> RuntimeResult<()> {
        self.send(WorkerCommand::ConnectionHandle { device, present })
    }

    // ------------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------------

    /// Run `callback` on the worker context after pending commands
    pub fn post<F>(&self, callback: F) -> RuntimeResult<()>
    where
        F: FnOnce(&mut RadioWorker) + Send + 'static,
    {
        self.send(WorkerCommand::Post {
            callback: Box::new(callback),
        })
    }

    /// Run `callback` once `delay` of tick time has passed
    pub fn post_delayed<F>(&self, delay: Duration, callback: F) -> RuntimeResult<CallbackId>
    where
        F: FnOnce(&mut RadioWorker) + Send + 'static,
    {
        let id = self.callback_ids.next();
        trace!(%id, ?delay, "Posting delayed callback");
        self.send(WorkerCommand::PostDelayed {
            id,
            delay,
            callback: Box::new(callback),
        })?;
        Ok(id)
    }

    pub fn remove_callback(&self, id: CallbackId) -> RuntimeResult<()> {
        self.send(WorkerCommand::RemoveCallback { id })
    }

    // ------------------------------------------------------------------------
    // Tracker Reads
    // ------------------------------------------------------------------------

    pub fn manager_state(&self) -> StateMask<ManagerState> {
        self.manager.bits()
    }

    pub fn manager_tracker(&self) -> Arc<StateTracker<ManagerState>> {
        self.manager.clone()
    }

    /// `None` until the worker has seen a report for `device`
    pub fn device_state(&self, device: DeviceId) -> Option<StateMask<DeviceState>> {
        self.devices.get(&device).map(|entry| entry.value().bits())
    }

    pub fn device_tracker(&self, device: DeviceId) -> Option<Arc<StateTracker<DeviceState>>> {
        self.devices.get(&device).map(|entry| entry.value().clone())
    }

    pub fn known_devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self.devices.iter().map(|entry| *entry.key()).collect();
        devices.sort();
        devices
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn shutdown(&self) -> RuntimeResult<()> {
        self.send(WorkerCommand::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
