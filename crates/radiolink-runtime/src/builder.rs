//! Runtime Builder API
//!
//! Wires configuration, trackers, listeners and the platform adapter into a
//! [`RadioWorker`] and either hands the worker back for manual driving or
//! spawns it on the tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use radiolink_core::{
    DeviceId, DeviceState, ManagerState, RadioAdapter, RadioConfig, StateMask, StateTracker,
    SystemTimeSource, TaskOutcome, TimeSource, Transition, TransitionListener,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::command_channel;
use crate::error::{RuntimeError, RuntimeResult};
use crate::handle::RadioHandle;
use crate::worker::{
    DeviceRegistry, DeviceTransitionListener, OutcomeObserver, RadioWorker, WorkerParts,
};

/// How long shutdown waits for the worker to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

pub struct RuntimeBuilder {
    config: RadioConfig,
    initial_manager_state: StateMask<ManagerState>,
    manager_listener: Option<TransitionListener<ManagerState>>,
    device_listener: Option<DeviceTransitionListener>,
    outcome_observer: Option<OutcomeObserver>,
    time_source: Arc<dyn TimeSource>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Default configuration with the radio assumed off
    pub fn new() -> Self {
        Self {
            config: RadioConfig::default(),
            initial_manager_state: StateMask::from(ManagerState::Off),
            manager_listener: None,
            device_listener: None,
            outcome_observer: None,
            time_source: Arc::new(SystemTimeSource::new()),
        }
    }

    /// Hand-driven ticks and short timeouts
    pub fn testing() -> Self {
        Self::new().with_config(RadioConfig::testing())
    }

    pub fn with_config(mut self, config: RadioConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_initial_manager_state(mut self, state: StateMask<ManagerState>) -> Self {
        self.initial_manager_state = state;
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn with_auto_tick(mut self, auto_tick: bool) -> Self {
        self.config.scheduler.auto_tick = auto_tick;
        self
    }

    pub fn on_manager_transition<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Transition<ManagerState>) + Send + Sync + 'static,
    {
        self.manager_listener = Some(Arc::new(listener));
        self
    }

    /// Installed on every device tracker the worker creates
    pub fn on_device_transition<F>(mut self, listener: F) -> Self
    where
        F: Fn(DeviceId, &Transition<DeviceState>) + Send + Sync + 'static,
    {
        self.device_listener = Some(Arc::new(listener));
        self
    }

    /// Observe every task outcome after its own listener ran
    pub fn on_outcome<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TaskOutcome) + Send + Sync + 'static,
    {
        self.outcome_observer = Some(Arc::new(observer));
        self
    }

    /// Build the worker without spawning it
    ///
    /// The adapter factory receives a handle so the platform binding can
    /// report state changes and completions back into the worker.
    pub fn build<F>(self, adapter: F) -> RuntimeResult<(RadioWorker, RadioHandle)>
    where
        F: FnOnce(RadioHandle) -> Box<dyn RadioAdapter>,
    {
        self.config.validate()?;

        let (sender, receiver) = command_channel();
        let manager = Arc::new(StateTracker::with_time_source(
            self.initial_manager_state,
            self.time_source.clone(),
        ));
        if let Some(listener) = self.manager_listener {
            manager.set_listener(move |transition| listener(transition));
        }
        let devices: DeviceRegistry = Arc::new(DashMap::new());

        let handle = RadioHandle::new(sender, manager.clone(), devices.clone());
        let adapter = adapter(handle.clone());

        let worker = RadioWorker::new(WorkerParts {
            config: self.config,
            manager,
            devices,
            adapter,
            receiver,
            device_listener: self.device_listener,
            outcome_observer: self.outcome_observer,
            time_source: self.time_source,
        });
        Ok((worker, handle))
    }

    /// Build and spawn the worker on the current tokio runtime
    pub async fn build_and_start<F>(self, adapter: F) -> RuntimeResult<RuntimeHandle>
    where
        F: FnOnce(RadioHandle) -> Box<dyn RadioAdapter>,
    {
        let (worker, handle) = self.build(adapter)?;
        info!("Starting radio worker");
        let join = tokio::spawn(worker.run());
        Ok(RuntimeHandle {
            handle,
            join: Some(join),
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Owns the spawned worker task
pub struct RuntimeHandle {
    handle: RadioHandle,
    join: Option<JoinHandle<RuntimeResult<()>>>,
}

impl RuntimeHandle {
    pub fn handle(&self) -> RadioHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Wait for the worker to stop on its own
    pub async fn wait(&mut self) -> RuntimeResult<()> {
        match self.join.take() {
            Some(join) => join
                .await
                .map_err(|err| RuntimeError::worker(format!("worker task panicked: {err}")))?,
            None => Ok(()),
        }
    }

    /// Ask the worker to stop and wait for it to drain
    pub async fn shutdown(&mut self) -> RuntimeResult<()> {
        info!("Shutting down radio worker");
        // the worker may already be gone
        let _ = self.handle.shutdown();

        if let Some(join) = self.join.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, join).await {
                Ok(joined) => joined.map_err(|err| RuntimeError::worker(err.to_string()))??,
                Err(_) => {
                    warn!(grace = ?SHUTDOWN_GRACE, "Radio worker did not stop in time");
                    return Err(RuntimeError::worker("shutdown timed out"));
                }
            }
        }

        info!("Radio worker shut down");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Start a hand-ticked worker with the radio already on
pub async fn create_test_runtime<F>(adapter: F) -> RuntimeResult<RuntimeHandle>
where
    F: FnOnce(RadioHandle) -> Box<dyn RadioAdapter>,
{
    RuntimeBuilder::testing()
        .with_initial_manager_state(StateMask::from(ManagerState::On))
        .build_and_start(adapter)
        .await
}
