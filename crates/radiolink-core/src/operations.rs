//! Built-in operations
//!
//! One constructor per [`TaskKind`]. Each wires the capability record for
//! that kind: priority, precondition, redundancy check, preemption rules,
//! the adapter call made on execute, and how completion is recognized
//! from tracker transitions.
//!
//! ```
//! use radiolink_core::{operations, DeviceId, TaskKind, TaskPriority};
//!
//! let device = DeviceId::new([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
//! let task = operations::connect(device, true);
//! assert_eq!(task.kind(), TaskKind::Connect);
//! assert_eq!(task.priority(), TaskPriority::Medium);
//! ```

use core::time::Duration;

use crate::adapter::StateView;
use crate::policy;
use crate::state::{DeviceState, ManagerState, StateEvent, Transition};
use crate::task::{
    Characteristic, ConnectionPriority, Operation, Payload, Step, Task, TaskBuilder, TaskInfo,
    TaskPriority, Timeout,
};
use crate::types::{DeviceId, ServerId, Target, TransactionId};

// ----------------------------------------------------------------------------
// Manager Operations
// ----------------------------------------------------------------------------

/// Power the radio on
pub fn turn_on() -> Task {
    Task::builder(Target::Manager, Operation::TurnOn)
        .priority(TaskPriority::Critical)
        .redundant_when(|_, state| state.manager_state().contains(ManagerState::On))
        .cancellable_by(policy::turn_on_cancellable_by)
        .abortable(true)
        .execute(|ctx| {
            ctx.adapter.enable_radio()?;
            Ok(Step::Continue)
        })
        .completes_on(manager_reached_on)
        .build()
}

/// Power the radio off; `implicit` when issued by the library itself
pub fn turn_off(implicit: bool) -> Task {
    Task::builder(Target::Manager, Operation::TurnOff { implicit })
        .priority(TaskPriority::Critical)
        .redundant_when(|_, state| state.manager_state().contains(ManagerState::Off))
        .execute(|ctx| {
            ctx.adapter.disable_radio()?;
            Ok(Step::Continue)
        })
        .completes_on(manager_reached_off)
        .build()
}

/// Reset the native stack after a crash
///
/// Completion is reported explicitly by whoever observes the stack come back.
pub fn resolve_crashes(part_of_reset: bool) -> Task {
    Task::builder(Target::Manager, Operation::ResolveCrashes { part_of_reset })
        .priority(TaskPriority::Critical)
        .cancellable_by(policy::crash_resolver_cancellable_by)
        .execute(|ctx| {
            ctx.adapter.reset_stack()?;
            Ok(Step::Continue)
        })
        .build()
}

/// Scan for peers, for `duration` or until completed
///
/// Any non-trivial task interrupts the scan; it goes back into the queue
/// and restarts once the radio is free again. Only the radio going down
/// ends it early. The hardware scan is stopped whenever the task stops
/// executing.
pub fn scan(duration: Option<Duration>) -> Task {
    Task::builder(Target::Manager, Operation::Scan { duration })
        .priority(TaskPriority::Trivial)
        .cancellable_by(policy::radio_down_cancellable_by)
        .interruptible_by(policy::scan_interruptible_by)
        .timeout(Timeout::Infinite)
        .abortable(true)
        .execute(move |ctx| {
            ctx.adapter.start_scan(duration)?;
            Ok(Step::Continue)
        })
        .on_update(move |ctx| match duration {
            Some(limit) if ctx.elapsed >= limit => Ok(Step::Succeed),
            _ => Ok(Step::Continue),
        })
        .on_leave(|_, adapter| adapter.stop_scan())
        .completes_on(radio_lost)
        .build()
}

/// Hold the radio idle for `interval`
pub fn delay(interval: Duration) -> Task {
    Task::builder(Target::Manager, Operation::Delay { interval })
        .priority(TaskPriority::Low)
        .precondition(policy::always_ready)
        .timeout(Timeout::Infinite)
        .abortable(true)
        .execute(move |_| {
            if interval.is_zero() {
                Ok(Step::Succeed)
            } else {
                Ok(Step::Continue)
            }
        })
        .on_update(move |ctx| {
            if ctx.elapsed >= interval {
                Ok(Step::Succeed)
            } else {
                Ok(Step::Continue)
            }
        })
        .build()
}

// ----------------------------------------------------------------------------
// Device Operations
// ----------------------------------------------------------------------------

fn device_task(device: DeviceId, operation: Operation) -> TaskBuilder {
    Task::builder(Target::Device(device), operation)
}

/// Open a connection; `explicit` when the application asked for it
///
/// An explicit disconnect of the same device lets the attempt finish and
/// runs afterwards; an implicit one abandons it.
pub fn connect(device: DeviceId, explicit: bool) -> Task {
    device_task(device, Operation::Connect { explicit })
        .redundant_when(|info, state| device_has(info, state, DeviceState::Connected))
        .cancellable_by(policy::connect_cancellable_by)
        .softly_cancellable_by(policy::connect_softly_cancellable_by)
        .abortable(true)
        .execute(move |ctx| {
            ctx.adapter.connect(device)?;
            Ok(Step::Continue)
        })
        .completes_on(connect_completion)
        .build()
}

/// Close a connection
///
/// With `cancellable_by_connect`, an explicit disconnect still in the queue
/// is softly cancelled by a later connect to the same device.
pub fn disconnect(device: DeviceId, explicit: bool, cancellable_by_connect: bool) -> Task {
    device_task(
        device,
        Operation::Disconnect {
            explicit,
            cancellable_by_connect,
        },
    )
    .priority(TaskPriority::High)
    .redundant_when(|info, state| device_has(info, state, DeviceState::Disconnected))
    .softly_cancellable_by(policy::disconnect_softly_cancellable_by)
    .execute(move |ctx| {
        ctx.adapter.disconnect(device)?;
        Ok(Step::Continue)
    })
    .completes_on(|info, event| {
        device_step(info, event, |transition| {
            if transition.entered(DeviceState::Disconnected) {
                Step::Succeed
            } else {
                Step::Continue
            }
        })
    })
    .build()
}

pub fn discover_services(device: DeviceId) -> Task {
    device_task(device, Operation::DiscoverServices)
        .execute(move |ctx| {
            ctx.adapter.discover_services(device)?;
            Ok(Step::Continue)
        })
        .completes_on(|info, event| {
            device_step(info, event, |transition| {
                if transition.entered(DeviceState::ServicesDiscovered) {
                    Step::Succeed
                } else {
                    fail_on_disconnect(transition)
                }
            })
        })
        .build()
}

pub fn bond(device: DeviceId, explicit: bool) -> Task {
    device_task(device, Operation::Bond { explicit })
        .redundant_when(|info, state| device_has(info, state, DeviceState::Bonded))
        .execute(move |ctx| {
            ctx.adapter.bond(device)?;
            Ok(Step::Continue)
        })
        .completes_on(bond_completion)
        .build()
}

/// Remove the bond; outranks every other priority
pub fn unbond(device: DeviceId) -> Task {
    device_task(device, Operation::Unbond)
        .priority(TaskPriority::Unbond)
        .redundant_when(|info, state| device_has(info, state, DeviceState::Unbonded))
        .execute(move |ctx| {
            ctx.adapter.unbond(device)?;
            Ok(Step::Continue)
        })
        .completes_on(|info, event| {
            device_step(info, event, |transition| {
                if transition.entered(DeviceState::Unbonded) {
                    Step::Succeed
                } else {
                    Step::Continue
                }
            })
        })
        .build()
}

// ----------------------------------------------------------------------------
// Connected Transactions
// ----------------------------------------------------------------------------
//
// These need a live connection and complete explicitly when the adapter
// delivers the result. A disconnect mid-flight fails them.

fn transaction(device: DeviceId, operation: Operation) -> TaskBuilder {
    device_task(device, operation).completes_on(|info, event| {
        device_step(info, event, fail_on_disconnect)
    })
}

pub fn read(device: DeviceId, target: Characteristic) -> Task {
    transaction(device, Operation::Read { target })
        .execute(move |ctx| {
            ctx.adapter.read(device, &target)?;
            Ok(Step::Continue)
        })
        .build()
}

pub fn write(device: DeviceId, target: Characteristic, data: &[u8]) -> Task {
    let data = Payload::from_slice(data);
    let payload = data.clone();
    transaction(device, Operation::Write { target, data })
        .execute(move |ctx| {
            ctx.adapter.write(device, &target, &payload)?;
            Ok(Step::Continue)
        })
        .build()
}

pub fn toggle_notify(device: DeviceId, target: Characteristic, enable: bool) -> Task {
    transaction(device, Operation::ToggleNotify { target, enable })
        .execute(move |ctx| {
            ctx.adapter.set_notify(device, &target, enable)?;
            Ok(Step::Continue)
        })
        .build()
}

pub fn read_rssi(device: DeviceId) -> Task {
    transaction(device, Operation::ReadRssi)
        .execute(move |ctx| {
            ctx.adapter.read_rssi(device)?;
            Ok(Step::Continue)
        })
        .build()
}

pub fn request_mtu(device: DeviceId, mtu: u16) -> Task {
    transaction(device, Operation::RequestMtu { mtu })
        .execute(move |ctx| {
            ctx.adapter.request_mtu(device, mtu)?;
            Ok(Step::Continue)
        })
        .build()
}

pub fn request_connection_priority(device: DeviceId, priority: ConnectionPriority) -> Task {
    transaction(device, Operation::RequestConnectionPriority { priority })
        .execute(move |ctx| {
            ctx.adapter.request_connection_priority(device, priority)?;
            Ok(Step::Continue)
        })
        .build()
}

/// Hold the radio for `device` until `transaction` ends
///
/// Tasks tagged with the same transaction jump ahead of the lock and
/// interrupt it while it holds the radio, so nothing else reaches the
/// device in between. The owner releases the lock once the transaction is
/// over.
pub fn transaction_lock(device: DeviceId, transaction: TransactionId) -> Task {
    device_task(device, Operation::TransactionLock)
        .priority(TaskPriority::AtomicTransaction)
        .transaction(transaction)
        .interruptible_by(policy::transaction_lock_interruptible_by)
        .timeout(Timeout::Infinite)
        .abortable(true)
        .completes_on(|info, event| device_step(info, event, fail_on_disconnect))
        .build()
}

// ----------------------------------------------------------------------------
// Server Operations
// ----------------------------------------------------------------------------

/// Accept an incoming client on a local server
pub fn connect_server(server: ServerId, client: DeviceId) -> Task {
    Task::builder(Target::Server(server), Operation::ConnectServer { client })
        .execute(move |ctx| {
            ctx.adapter.connect_server_client(server, client)?;
            Ok(Step::Continue)
        })
        .completes_on(radio_lost)
        .build()
}

pub fn disconnect_server(server: ServerId, client: DeviceId) -> Task {
    Task::builder(Target::Server(server), Operation::DisconnectServer { client })
        .priority(TaskPriority::High)
        .execute(move |ctx| {
            ctx.adapter.disconnect_server_client(server, client)?;
            Ok(Step::Continue)
        })
        .completes_on(radio_lost)
        .build()
}

// ----------------------------------------------------------------------------
// Completion Matchers
// ----------------------------------------------------------------------------

fn device_has(info: &TaskInfo, state: &dyn StateView, flag: DeviceState) -> bool {
    info.target
        .device()
        .and_then(|device| state.device_state(device))
        .map_or(false, |bits| bits.contains(flag))
}

/// Route a device transition for the task's own target through `decide`;
/// the radio going down fails any device task
fn device_step(
    info: &TaskInfo,
    event: &StateEvent,
    decide: impl FnOnce(&Transition<DeviceState>) -> Step,
) -> Step {
    match event {
        StateEvent::Device(device, transition) if info.target == Target::Device(*device) => {
            decide(transition)
        }
        StateEvent::Manager(_) => radio_lost(info, event),
        _ => Step::Continue,
    }
}

fn fail_on_disconnect(transition: &Transition<DeviceState>) -> Step {
    if transition.entered(DeviceState::Disconnected) {
        Step::Fail
    } else {
        Step::Continue
    }
}

fn radio_lost(_info: &TaskInfo, event: &StateEvent) -> Step {
    match event {
        StateEvent::Manager(transition) if transition.exited(ManagerState::On) => Step::Fail,
        _ => Step::Continue,
    }
}

fn manager_reached_on(_info: &TaskInfo, event: &StateEvent) -> Step {
    match event {
        StateEvent::Manager(transition) if transition.entered(ManagerState::On) => Step::Succeed,
        _ => Step::Continue,
    }
}

fn manager_reached_off(_info: &TaskInfo, event: &StateEvent) -> Step {
    match event {
        StateEvent::Manager(transition) if transition.entered(ManagerState::Off) => Step::Succeed,
        _ => Step::Continue,
    }
}

/// Connected succeeds; dropping back to disconnected fails, whoever caused it
fn connect_completion(info: &TaskInfo, event: &StateEvent) -> Step {
    device_step(info, event, |transition| {
        if transition.entered(DeviceState::Connected) {
            Step::Succeed
        } else {
            fail_on_disconnect(transition)
        }
    })
}

fn bond_completion(info: &TaskInfo, event: &StateEvent) -> Step {
    device_step(info, event, |transition| {
        if transition.entered(DeviceState::Bonded) {
            Step::Succeed
        } else if transition.exited(DeviceState::Bonding)
            && transition.new_state().contains(DeviceState::Unbonded)
        {
            Step::Fail
        } else {
            fail_on_disconnect(transition)
        }
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
