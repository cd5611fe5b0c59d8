//! Hardware boundary
//!
//! [`RadioAdapter`] is the only way tasks touch the radio. Every call only
//! dispatches; results come back later as state updates or explicit
//! completions routed through the worker. [`StateView`] gives task hooks
//! read access to the trackers without handing them the trackers themselves.

use core::time::Duration;
use std::collections::{HashMap, HashSet};

use crate::errors::AdapterError;
use crate::state::{DeviceState, ManagerState, StateMask};
use crate::task::{Characteristic, ConnectionPriority};
use crate::types::{DeviceId, ServerId};

pub type AdapterResult = Result<(), AdapterError>;

// ----------------------------------------------------------------------------
// Radio Adapter
// ----------------------------------------------------------------------------

/// Raw primitives of the platform radio stack
pub trait RadioAdapter: Send {
    fn enable_radio(&mut self) -> AdapterResult;
    fn disable_radio(&mut self) -> AdapterResult;
    /// Tear down and restart the stack after a crash
    fn reset_stack(&mut self) -> AdapterResult;

    fn start_scan(&mut self, duration: Option<Duration>) -> AdapterResult;
    fn stop_scan(&mut self) -> AdapterResult;

    fn connect(&mut self, device: DeviceId) -> AdapterResult;
    fn disconnect(&mut self, device: DeviceId) -> AdapterResult;
    fn discover_services(&mut self, device: DeviceId) -> AdapterResult;
    fn bond(&mut self, device: DeviceId) -> AdapterResult;
    fn unbond(&mut self, device: DeviceId) -> AdapterResult;

    fn read(&mut self, device: DeviceId, target: &Characteristic) -> AdapterResult;
    fn write(&mut self, device: DeviceId, target: &Characteristic, data: &[u8]) -> AdapterResult;
    fn set_notify(&mut self, device: DeviceId, target: &Characteristic, enable: bool)
        -> AdapterResult;
    fn read_rssi(&mut self, device: DeviceId) -> AdapterResult;
    fn request_mtu(&mut self, device: DeviceId, mtu: u16) -> AdapterResult;
    fn request_connection_priority(
        &mut self,
        device: DeviceId,
        priority: ConnectionPriority,
    ) -> AdapterResult;

    fn connect_server_client(&mut self, server: ServerId, client: DeviceId) -> AdapterResult;
    fn disconnect_server_client(&mut self, server: ServerId, client: DeviceId) -> AdapterResult;
}

// ----------------------------------------------------------------------------
// State View
// ----------------------------------------------------------------------------

/// Read-only view of tracked state
pub trait StateView {
    fn manager_state(&self) -> StateMask<ManagerState>;

    /// `None` for a device that has never been reported
    fn device_state(&self, device: DeviceId) -> Option<StateMask<DeviceState>>;

    /// Whether a live low-level connection handle exists
    fn has_connection(&self, device: DeviceId) -> bool;
}

/// Owned snapshot of state, used where no live trackers exist
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub manager: StateMask<ManagerState>,
    pub devices: HashMap<DeviceId, StateMask<DeviceState>>,
    pub connections: HashSet<DeviceId>,
}

impl StateSnapshot {
    pub fn new(manager: StateMask<ManagerState>) -> Self {
        Self {
            manager,
            ..Self::default()
        }
    }

    pub fn radio_on() -> Self {
        Self::new(StateMask::from(ManagerState::On))
    }

    pub fn with_device(mut self, device: DeviceId, state: StateMask<DeviceState>) -> Self {
        self.devices.insert(device, state);
        self
    }

    /// Mark a device CONNECTED with a live handle
    pub fn with_connected(mut self, device: DeviceId) -> Self {
        let state = self
            .devices
            .get(&device)
            .copied()
            .unwrap_or_default()
            .without(DeviceState::Disconnected)
            .without(DeviceState::Connecting)
            .with(DeviceState::Connected);
        self.devices.insert(device, state);
        self.connections.insert(device);
        self
    }
}

impl StateView for StateSnapshot {
    fn manager_state(&self) -> StateMask<ManagerState> {
        self.manager
    }

    fn device_state(&self, device: DeviceId) -> Option<StateMask<DeviceState>> {
        self.devices.get(&device).copied()
    }

    fn has_connection(&self, device: DeviceId) -> bool {
        self.connections.contains(&device)
    }
}

// ----------------------------------------------------------------------------
// Mock Adapter
// ----------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub use mock::{AdapterCall, MockAdapter};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// One recorded adapter invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum AdapterCall {
        EnableRadio,
        DisableRadio,
        ResetStack,
        StartScan(Option<Duration>),
        StopScan,
        Connect(DeviceId),
        Disconnect(DeviceId),
        DiscoverServices(DeviceId),
        Bond(DeviceId),
        Unbond(DeviceId),
        Read(DeviceId, Characteristic),
        Write(DeviceId, Characteristic, Vec<u8>),
        SetNotify(DeviceId, Characteristic, bool),
        ReadRssi(DeviceId),
        RequestMtu(DeviceId, u16),
        RequestConnectionPriority(DeviceId, ConnectionPriority),
        ConnectServerClient(ServerId, DeviceId),
        DisconnectServerClient(ServerId, DeviceId),
    }

    impl AdapterCall {
        pub fn name(&self) -> &'static str {
            match self {
                AdapterCall::EnableRadio => "enable_radio",
                AdapterCall::DisableRadio => "disable_radio",
                AdapterCall::ResetStack => "reset_stack",
                AdapterCall::StartScan(_) => "start_scan",
                AdapterCall::StopScan => "stop_scan",
                AdapterCall::Connect(_) => "connect",
                AdapterCall::Disconnect(_) => "disconnect",
                AdapterCall::DiscoverServices(_) => "discover_services",
                AdapterCall::Bond(_) => "bond",
                AdapterCall::Unbond(_) => "unbond",
                AdapterCall::Read(..) => "read",
                AdapterCall::Write(..) => "write",
                AdapterCall::SetNotify(..) => "set_notify",
                AdapterCall::ReadRssi(_) => "read_rssi",
                AdapterCall::RequestMtu(..) => "request_mtu",
                AdapterCall::RequestConnectionPriority(..) => "request_connection_priority",
                AdapterCall::ConnectServerClient(..) => "connect_server_client",
                AdapterCall::DisconnectServerClient(..) => "disconnect_server_client",
            }
        }
    }

    /// Adapter that records every call and can be told to reject some
    ///
    /// Clones share the call log, so a test can keep one clone while the
    /// other is boxed into a worker.
    #[derive(Debug, Clone, Default)]
    pub struct MockAdapter {
        calls: Arc<Mutex<Vec<AdapterCall>>>,
        rejected: Arc<Mutex<HashSet<&'static str>>>,
    }

    impl MockAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every future call with this name, e.g. `"connect"`
        pub fn reject(&self, call: &'static str) {
            lock(&self.rejected).insert(call);
        }

        pub fn calls(&self) -> Vec<AdapterCall> {
            lock(&self.calls).clone()
        }

        pub fn take_calls(&self) -> Vec<AdapterCall> {
            std::mem::take(&mut *lock(&self.calls))
        }

        pub fn count(&self, name: &str) -> usize {
            lock(&self.calls)
                .iter()
                .filter(|call| call.name() == name)
                .count()
        }

        fn record(&mut self, call: AdapterCall) -> AdapterResult {
            let name = call.name();
            lock(&self.calls).push(call);
            if lock(&self.rejected).contains(name) {
                Err(AdapterError::rejected(name, "rejected by mock"))
            } else {
                Ok(())
            }
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl RadioAdapter for MockAdapter {
        fn enable_radio(&mut self) -> AdapterResult {
            self.record(AdapterCall::EnableRadio)
        }

        fn disable_radio(&mut self) -> AdapterResult {
            self.record(AdapterCall::DisableRadio)
        }

        fn reset_stack(&mut self) -> AdapterResult {
            self.record(AdapterCall::ResetStack)
        }

        fn start_scan(&mut self, duration: Option<Duration>) -> AdapterResult {
            self.record(AdapterCall::StartScan(duration))
        }

        fn stop_scan(&mut self) -> AdapterResult {
            self.record(AdapterCall::StopScan)
        }

        fn connect(&mut self, device: DeviceId) -> AdapterResult {
            self.record(AdapterCall::Connect(device))
        }

        fn disconnect(&mut self, device: DeviceId) -> AdapterResult {
            self.record(AdapterCall::Disconnect(device))
        }

        fn discover_services(&mut self, device: DeviceId) -> AdapterResult {
            self.record(AdapterCall::DiscoverServices(device))
        }

        fn bond(&mut self, device: DeviceId) -> AdapterResult {
            self.record(AdapterCall::Bond(device))
        }

        fn unbond(&mut self, device: DeviceId) -> AdapterResult {
            self.record(AdapterCall::Unbond(device))
        }

        fn read(&mut self, device: DeviceId, target: &Characteristic) -> AdapterResult {
            self.record(AdapterCall::Read(device, *target))
        }

        fn write(&mut self, device: DeviceId, target: &Characteristic, data: &[u8]) -> AdapterResult {
            self.record(AdapterCall::Write(device, *target, data.to_vec()))
        }

        fn set_notify(
            &mut self,
            device: DeviceId,
            target: &Characteristic,
            enable: bool,
        ) -> AdapterResult {
            self.record(AdapterCall::SetNotify(device, *target, enable))
        }

        fn read_rssi(&mut self, device: DeviceId) -> AdapterResult {
            self.record(AdapterCall::ReadRssi(device))
        }

        fn request_mtu(&mut self, device: DeviceId, mtu: u16) -> AdapterResult {
            self.record(AdapterCall::RequestMtu(device, mtu))
        }

        fn request_connection_priority(
            &mut self,
            device: DeviceId,
            priority: ConnectionPriority,
        ) -> AdapterResult {
            self.record(AdapterCall::RequestConnectionPriority(device, priority))
        }

        fn connect_server_client(&mut self, server: ServerId, client: DeviceId) -> AdapterResult {
            self.record(AdapterCall::ConnectServerClient(server, client))
        }

        fn disconnect_server_client(
            &mut self,
            server: ServerId,
            client: DeviceId,
        ) -> AdapterResult {
            self.record(AdapterCall::DisconnectServerClient(server, client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_and_rejects() {
        let device = DeviceId::new([1, 2, 3, 4, 5, 6]);
        let mut adapter = MockAdapter::new();
        let log = adapter.clone();
        adapter.reject("connect");

        assert!(adapter.enable_radio().is_ok());
        assert!(adapter.connect(device).is_err());
        assert_eq!(
            adapter.calls(),
            &[AdapterCall::EnableRadio, AdapterCall::Connect(device)]
        );
        assert_eq!(log.count("connect"), 1);
        assert_eq!(log.take_calls().len(), 2);
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn test_snapshot_view() {
        let device = DeviceId::new([9; 6]);
        let view = StateSnapshot::radio_on()
            .with_device(device, DeviceState::discovered_mask())
            .with_connected(device);

        assert!(view.manager_state().contains(ManagerState::On));
        assert!(view.has_connection(device));
        let bits = view.device_state(device).unwrap();
        assert!(bits.contains(DeviceState::Connected));
        assert!(!bits.contains(DeviceState::Disconnected));
        assert!(view.device_state(DeviceId::new([0; 6])).is_none());
    }
}
