//! Task ordering policy
//!
//! Where a new task goes in the queue, what it may cancel or interrupt, and
//! whether a queued task may run yet. Everything here is a pure function of
//! task descriptions and tracked state.

use std::collections::VecDeque;

use crate::adapter::StateView;
use crate::state::{DeviceState, ManagerState};
use crate::task::{Gate, Operation, Task, TaskInfo, TaskKind, TaskPriority};
use crate::types::Target;

// ----------------------------------------------------------------------------
// Insertion
// ----------------------------------------------------------------------------

/// Queue index at which `candidate` should be inserted
///
/// The candidate goes before the first task it is more important than, but
/// never ahead of a task for the same target with equal or higher priority,
/// so per-entity submission order is preserved.
pub fn insertion_index(candidate: &Task, queue: &VecDeque<Task>, head: Option<&Target>) -> usize {
    if queue.is_empty() {
        return 0;
    }

    // Most submissions land at the tail
    if let Some(last) = queue.back() {
        if !candidate.is_more_important_than(last, head) {
            return queue.len();
        }
    }

    // a transaction's own lock does not hold its members back
    let floor = queue
        .iter()
        .rposition(|queued| {
            queued.target() == candidate.target()
                && queued.priority() >= candidate.priority()
                && !joins_lock(candidate.info(), queued.info())
        })
        .map_or(0, |index| index + 1);

    (floor..queue.len())
        .find(|&index| candidate.is_more_important_than(&queue[index], head))
        .unwrap_or(queue.len())
}

/// `candidate` belongs to the transaction `lock` holds the radio for
fn joins_lock(candidate: &TaskInfo, lock: &TaskInfo) -> bool {
    lock.is(TaskKind::TransactionLock) && candidate.same_transaction(lock)
}

/// Priority first; at equal priority, work for the target currently on the
/// radio goes ahead of other targets
///
/// Members of a transaction go ahead of its lock. Ordinary reads and writes
/// never jump a queued scan.
pub fn default_more_important(candidate: &TaskInfo, other: &TaskInfo, head: Option<&Target>) -> bool {
    if joins_lock(candidate, other) {
        return true;
    }
    if other.is(TaskKind::Scan)
        && candidate.kind().is_transactionable()
        && candidate.priority <= TaskPriority::Medium
    {
        return false;
    }
    if candidate.priority != other.priority {
        return candidate.priority > other.priority;
    }
    match head {
        Some(head) => candidate.target == *head && other.target != *head,
        None => false,
    }
}

/// Strict priority comparison only
pub fn priority_only(candidate: &TaskInfo, other: &TaskInfo, _head: Option<&Target>) -> bool {
    candidate.priority > other.priority
}

// ----------------------------------------------------------------------------
// Cancellation and Interruption
// ----------------------------------------------------------------------------

pub fn never(_this: &TaskInfo, _other: &TaskInfo) -> bool {
    false
}

/// Turning the radio off, or a crash recovery that resets the whole stack
fn takes_radio_down(other: &TaskInfo) -> bool {
    matches!(
        other.operation,
        Operation::TurnOff { .. } | Operation::ResolveCrashes { part_of_reset: true }
    )
}

/// Default cancellation rule
///
/// Anything needing the radio yields to a task that takes the radio down.
/// Otherwise a task yields to a strictly higher priority task for the same
/// target.
pub fn default_cancellable_by(this: &TaskInfo, other: &TaskInfo) -> bool {
    if this.kind().requires_radio() && takes_radio_down(other) {
        return true;
    }
    other.priority > this.priority && other.target == this.target
}

/// Only a task that takes the radio down ends this one; everything else
/// has to go through interruption
pub fn radio_down_cancellable_by(_this: &TaskInfo, other: &TaskInfo) -> bool {
    takes_radio_down(other)
}

/// A connect is abandoned for the radio going down or an implicit
/// disconnect of its device; an explicit disconnect waits for it
pub fn connect_cancellable_by(this: &TaskInfo, other: &TaskInfo) -> bool {
    if takes_radio_down(other) {
        return true;
    }
    matches!(other.operation, Operation::Disconnect { explicit: false, .. })
        && other.target == this.target
}

/// An explicit connect finishes in hardware, then gives way to a disconnect
/// of the same device
pub fn connect_softly_cancellable_by(this: &TaskInfo, other: &TaskInfo) -> bool {
    matches!(this.operation, Operation::Connect { explicit: true })
        && other.is(TaskKind::Disconnect)
        && other.target == this.target
}

/// Crash recovery yields to an implicit turn-off, or to any turn-off when it
/// is not part of a reset
pub fn crash_resolver_cancellable_by(this: &TaskInfo, other: &TaskInfo) -> bool {
    let part_of_reset = matches!(this.operation, Operation::ResolveCrashes { part_of_reset: true });
    match other.operation {
        Operation::TurnOff { implicit } => implicit || !part_of_reset,
        _ => false,
    }
}

/// A pending power-on yields to a power-off
pub fn turn_on_cancellable_by(_this: &TaskInfo, other: &TaskInfo) -> bool {
    other.is(TaskKind::TurnOff)
}

/// An explicit disconnect that allows it is softly cancelled by a connect to
/// the same device
pub fn disconnect_softly_cancellable_by(this: &TaskInfo, other: &TaskInfo) -> bool {
    let yields = matches!(
        this.operation,
        Operation::Disconnect {
            explicit: true,
            cancellable_by_connect: true
        }
    );
    yields && other.is(TaskKind::Connect) && other.target == this.target
}

/// Scanning gives the radio to any non-trivial task
pub fn scan_interruptible_by(_this: &TaskInfo, other: &TaskInfo) -> bool {
    other.priority > TaskPriority::Trivial
}

/// A held transaction lock steps aside for its own members
pub fn transaction_lock_interruptible_by(this: &TaskInfo, other: &TaskInfo) -> bool {
    joins_lock(other, this)
}

// ----------------------------------------------------------------------------
// Executability
// ----------------------------------------------------------------------------

pub fn always_ready(_info: &TaskInfo, _state: &dyn StateView) -> Gate {
    Gate::Ready
}

pub fn never_redundant(_info: &TaskInfo, _state: &dyn StateView) -> bool {
    false
}

/// Radio must be on
pub fn radio_on(_info: &TaskInfo, state: &dyn StateView) -> Gate {
    if state.manager_state().contains(ManagerState::On) {
        Gate::Ready
    } else {
        Gate::Never
    }
}

/// Target device must be CONNECTED with a live connection handle
///
/// A device still connecting may become ready on its own, so the task waits.
pub fn connected(info: &TaskInfo, state: &dyn StateView) -> Gate {
    let Some(device) = info.target.device() else {
        return Gate::Never;
    };
    let Some(bits) = state.device_state(device) else {
        return Gate::Never;
    };

    if bits.contains(DeviceState::Connected) && state.has_connection(device) {
        Gate::Ready
    } else if bits.contains_any(DeviceState::connecting_mask()) {
        Gate::NotYet
    } else {
        Gate::Never
    }
}

/// Precondition derived from the task's kind
pub fn default_precondition(info: &TaskInfo, state: &dyn StateView) -> Gate {
    let kind = info.kind();
    if kind.requires_radio() && radio_on(info, state) == Gate::Never {
        return Gate::Never;
    }
    if kind.requires_connection() {
        return connected(info, state);
    }
    Gate::Ready
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
