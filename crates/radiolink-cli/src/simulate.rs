//! Simulated radio hardware
//!
//! Answers every adapter call by posting a delayed callback that reports the
//! resulting state change or completion back into the worker, the way a
//! platform stack would call back after some latency.

use std::collections::HashSet;
use std::time::Duration;

use radiolink_core::{
    AdapterError, AdapterResult, Characteristic, ConnectionPriority, DeviceId, DeviceState,
    Intent, ManagerState, RadioAdapter, ServerId, Step, Target, TaskCriteria, TaskKind,
    STATUS_NOT_APPLICABLE,
};
use radiolink_runtime::{RadioHandle, RadioWorker};
use tracing::debug;

pub struct SimulatedRadio {
    handle: RadioHandle,
    latency: Duration,
    unreachable: HashSet<DeviceId>,
}

impl SimulatedRadio {
    pub fn new(handle: RadioHandle, latency: Duration) -> Self {
        Self {
            handle,
            latency,
            unreachable: HashSet::new(),
        }
    }

    pub fn with_unreachable(mut self, devices: impl IntoIterator<Item = DeviceId>) -> Self {
        self.unreachable.extend(devices);
        self
    }

    fn later<F>(&self, operation: &'static str, callback: F) -> AdapterResult
    where
        F: FnOnce(&mut RadioWorker) + Send + 'static,
    {
        debug!(operation, latency = ?self.latency, "Simulated hardware call");
        self.handle
            .post_delayed(self.latency, callback)
            .map(|_| ())
            .map_err(|e| AdapterError::unavailable(e.to_string()))
    }

    fn manager_becomes(
        &self,
        operation: &'static str,
        changes: Vec<(ManagerState, bool)>,
    ) -> AdapterResult {
        self.later(operation, move |worker| {
            let mut bits = worker.manager().bits();
            for (flag, value) in changes {
                bits = bits.set(flag, value);
            }
            worker.report_manager_state(
                bits,
                Intent::Intentional.into(),
                STATUS_NOT_APPLICABLE,
            );
        })
    }

    fn device_becomes(
        &self,
        operation: &'static str,
        device: DeviceId,
        changes: Vec<(DeviceState, bool)>,
    ) -> AdapterResult {
        self.later(operation, move |worker| {
            let mut bits = worker
                .device(device)
                .map(|tracker| tracker.bits())
                .unwrap_or_else(DeviceState::discovered_mask);
            for (flag, value) in changes {
                bits = bits.set(flag, value);
            }
            worker.report_device_state(
                device,
                bits,
                Intent::Intentional.into(),
                STATUS_NOT_APPLICABLE,
            );
        })
    }

    /// Succeed the executing task of `kind` on `target` after the latency
    fn answer(
        &self,
        operation: &'static str,
        kind: TaskKind,
        target: impl Into<Target>,
    ) -> AdapterResult {
        let criteria = TaskCriteria::kind(kind).on(target);
        self.later(operation, move |worker| {
            worker.complete(&criteria, Step::Succeed);
        })
    }
}

impl RadioAdapter for SimulatedRadio {
    fn enable_radio(&mut self) -> AdapterResult {
        self.manager_becomes(
            "enable_radio",
            vec![(ManagerState::Off, false), (ManagerState::On, true)],
        )
    }

    fn disable_radio(&mut self) -> AdapterResult {
        self.manager_becomes(
            "disable_radio",
            vec![
                (ManagerState::On, false),
                (ManagerState::Scanning, false),
                (ManagerState::Off, true),
            ],
        )
    }

    fn reset_stack(&mut self) -> AdapterResult {
        self.later("reset_stack", |worker| {
            worker.complete(&TaskCriteria::kind(TaskKind::ResolveCrashes), Step::Succeed);
        })
    }

    fn start_scan(&mut self, _duration: Option<Duration>) -> AdapterResult {
        self.manager_becomes("start_scan", vec![(ManagerState::Scanning, true)])
    }

    fn stop_scan(&mut self) -> AdapterResult {
        self.manager_becomes("stop_scan", vec![(ManagerState::Scanning, false)])
    }

    fn connect(&mut self, device: DeviceId) -> AdapterResult {
        if self.unreachable.contains(&device) {
            debug!(%device, "Device does not answer");
            return Ok(());
        }
        self.later("connect", move |worker| {
            worker.set_connection_handle(device, true);
            let bits = worker
                .device(device)
                .map(|tracker| tracker.bits())
                .unwrap_or_else(DeviceState::discovered_mask)
                .without(DeviceState::Disconnected)
                .without(DeviceState::Connecting)
                .with(DeviceState::Connected);
            worker.report_device_state(
                device,
                bits,
                Intent::Intentional.into(),
                STATUS_NOT_APPLICABLE,
            );
        })
    }

    fn disconnect(&mut self, device: DeviceId) -> AdapterResult {
        self.device_becomes(
            "disconnect",
            device,
            vec![
                (DeviceState::Connected, false),
                (DeviceState::ServicesDiscovered, false),
                (DeviceState::Initialized, false),
                (DeviceState::Disconnected, true),
            ],
        )
    }

    fn discover_services(&mut self, device: DeviceId) -> AdapterResult {
        self.device_becomes(
            "discover_services",
            device,
            vec![
                (DeviceState::DiscoveringServices, false),
                (DeviceState::ServicesDiscovered, true),
            ],
        )
    }

    fn bond(&mut self, device: DeviceId) -> AdapterResult {
        self.device_becomes(
            "bond",
            device,
            vec![(DeviceState::Unbonded, false), (DeviceState::Bonded, true)],
        )
    }

    fn unbond(&mut self, device: DeviceId) -> AdapterResult {
        self.device_becomes(
            "unbond",
            device,
            vec![(DeviceState::Bonded, false), (DeviceState::Unbonded, true)],
        )
    }

    fn read(&mut self, device: DeviceId, _target: &Characteristic) -> AdapterResult {
        self.answer("read", TaskKind::Read, device)
    }

    fn write(&mut self, device: DeviceId, _target: &Characteristic, data: &[u8]) -> AdapterResult {
        debug!(%device, bytes = data.len(), "Simulated write");
        self.answer("write", TaskKind::Write, device)
    }

    fn set_notify(
        &mut self,
        device: DeviceId,
        _target: &Characteristic,
        _enable: bool,
    ) -> AdapterResult {
        self.answer("set_notify", TaskKind::ToggleNotify, device)
    }

    fn read_rssi(&mut self, device: DeviceId) -> AdapterResult {
        self.answer("read_rssi", TaskKind::ReadRssi, device)
    }

    fn request_mtu(&mut self, device: DeviceId, _mtu: u16) -> AdapterResult {
        self.answer("request_mtu", TaskKind::RequestMtu, device)
    }

    fn request_connection_priority(
        &mut self,
        device: DeviceId,
        _priority: ConnectionPriority,
    ) -> AdapterResult {
        self.answer(
            "request_connection_priority",
            TaskKind::RequestConnectionPriority,
            device,
        )
    }

    fn connect_server_client(&mut self, server: ServerId, _client: DeviceId) -> AdapterResult {
        self.answer(
            "connect_server_client",
            TaskKind::ConnectServer,
            Target::Server(server),
        )
    }

    fn disconnect_server_client(&mut self, server: ServerId, _client: DeviceId) -> AdapterResult {
        self.answer(
            "disconnect_server_client",
            TaskKind::DisconnectServer,
            Target::Server(server),
        )
    }
}

