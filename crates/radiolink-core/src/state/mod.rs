//! Per-entity bitmask state
//!
//! Each manager or device owns one [`StateTracker`] over its own flag enum.
//! Trackers know nothing about what the bits mean; the flag enums do.

mod device_state;
mod flags;
mod manager_state;
mod tracker;

pub use device_state::DeviceState;
pub use flags::{Intent, StateFlag, StateMask};
pub use manager_state::ManagerState;
pub use tracker::{StateTracker, Transition, TransitionListener, STATUS_NOT_APPLICABLE};

use crate::types::DeviceId;

/// A tracker transition tagged with the entity it belongs to
///
/// This is what the worker hands the scheduler so the executing task can
/// decide whether the change completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Manager(Transition<ManagerState>),
    Device(DeviceId, Transition<DeviceState>),
}

impl StateEvent {
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            StateEvent::Device(id, _) => Some(*id),
            StateEvent::Manager(_) => None,
        }
    }
}
