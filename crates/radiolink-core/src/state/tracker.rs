//! Bitmask state tracker
//!
//! Holds the current bit-vector for one entity and turns whole-vector
//! updates into [`Transition`] descriptors. Reads are lock-free; the update
//! path takes a lock for time bookkeeping and releases it before the
//! listener runs, so a listener may query or even update the same tracker.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::flags::{Intent, StateFlag, StateMask};
use crate::types::{SystemTimeSource, TimeSource, Timestamp};

/// Status code for changes that carry no stack status
pub const STATUS_NOT_APPLICABLE: i32 = -1;

const MAX_FLAGS: usize = 64;

// ----------------------------------------------------------------------------
// Transition
// ----------------------------------------------------------------------------

/// What changed in one tracker update
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition<S> {
    old: StateMask<S>,
    new: StateMask<S>,
    /// Restricted to bits that actually changed
    intent: StateMask<S>,
    status: i32,
}

impl<S: StateFlag> Transition<S> {
    pub fn new(old: StateMask<S>, new: StateMask<S>, intent: StateMask<S>, status: i32) -> Self {
        Self {
            old,
            new,
            intent: intent.intersection(old.changed(new)),
            status,
        }
    }

    pub fn old(&self) -> StateMask<S> {
        self.old
    }

    pub fn new_state(&self) -> StateMask<S> {
        self.new
    }

    pub fn intent(&self) -> StateMask<S> {
        self.intent
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn changed(&self) -> StateMask<S> {
        self.old.changed(self.new)
    }

    pub fn entered(&self, flag: S) -> bool {
        !self.old.contains(flag) && self.new.contains(flag)
    }

    pub fn exited(&self, flag: S) -> bool {
        self.old.contains(flag) && !self.new.contains(flag)
    }

    /// True if `flag` changed as a direct result of a local operation
    pub fn was_intentional(&self, flag: S) -> bool {
        self.intent.contains(flag)
    }
}

impl<S: StateFlag> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("old", &self.old)
            .field("new", &self.new)
            .field("intent", &self.intent)
            .field("status", &self.status)
            .finish()
    }
}

impl<S: StateFlag> fmt::Display for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] -> [{}]", self.old, self.new)?;
        if !self.intent.is_empty() {
            write!(f, " intentional [{}]", self.intent)?;
        }
        if self.status != STATUS_NOT_APPLICABLE {
            write!(f, " status {}", self.status)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// State Tracker
// ----------------------------------------------------------------------------

pub type TransitionListener<S> = Arc<dyn Fn(&Transition<S>) + Send + Sync>;

#[derive(Clone, Copy)]
struct FlagTimes {
    entered_at: [Option<Timestamp>; MAX_FLAGS],
    last_stay: [Duration; MAX_FLAGS],
}

/// Current bit-vector of one manager or device
pub struct StateTracker<S: StateFlag> {
    bits: AtomicU64,
    times: Mutex<FlagTimes>,
    listener: Mutex<Option<TransitionListener<S>>>,
    clock: Arc<dyn TimeSource>,
    _flags: PhantomData<fn() -> S>,
}

impl<S: StateFlag> StateTracker<S> {
    pub fn new(initial: StateMask<S>) -> Self {
        Self::with_time_source(initial, Arc::new(SystemTimeSource::new()))
    }

    pub fn with_time_source(initial: StateMask<S>, clock: Arc<dyn TimeSource>) -> Self {
        let now = clock.now();
        let mut times = FlagTimes {
            entered_at: [None; MAX_FLAGS],
            last_stay: [Duration::ZERO; MAX_FLAGS],
        };
        for index in set_indices(initial.bits()) {
            times.entered_at[index] = Some(now);
        }

        Self {
            bits: AtomicU64::new(initial.bits()),
            times: Mutex::new(times),
            listener: Mutex::new(None),
            clock,
            _flags: PhantomData,
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn bits(&self) -> StateMask<S> {
        StateMask::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn is(&self, flag: S) -> bool {
        self.bits().contains(flag)
    }

    pub fn is_any(&self, mask: StateMask<S>) -> bool {
        self.bits().contains_any(mask)
    }

    pub fn is_all(&self, mask: StateMask<S>) -> bool {
        self.bits().contains_all(mask)
    }

    /// Time spent in `flag`
    ///
    /// While the flag is set this is the time since it was entered; once it
    /// is cleared it is the length of the most recent stay.
    pub fn time_in_state(&self, flag: S) -> Duration {
        let index = flag.bit_index() as usize;
        let times = self.lock_times();
        match times.entered_at[index] {
            Some(entered) if self.is(flag) => self.clock.now() - entered,
            _ => times.last_stay[index],
        }
    }

    // ------------------------------------------------------------------------
    // Listener
    // ------------------------------------------------------------------------

    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&Transition<S>) + Send + Sync + 'static,
    {
        *self.lock_listener() = Some(Arc::new(listener));
    }

    pub fn clear_listener(&self) {
        *self.lock_listener() = None;
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Replace the whole vector
    ///
    /// Returns the transition and notifies the listener exactly once when
    /// `new` differs from the stored vector; an identical vector is a no-op.
    /// Callers serialize updates through one worker context, so listener
    /// calls arrive in update order.
    pub fn update(
        &self,
        new: StateMask<S>,
        intent: StateMask<S>,
        status: i32,
    ) -> Option<Transition<S>> {
        let transition = {
            let mut times = self.lock_times();
            let old = self.bits();
            if old == new {
                return None;
            }

            let now = self.clock.now();
            for index in set_indices(old.changed(new).bits()) {
                let bit = 1u64 << index;
                if new.bits() & bit != 0 {
                    times.entered_at[index] = Some(now);
                } else if let Some(entered) = times.entered_at[index] {
                    times.last_stay[index] = now - entered;
                }
            }

            self.bits.store(new.bits(), Ordering::Release);
            Transition::new(old, new, intent, status)
        };

        trace!(transition = %transition, "State changed");

        let listener = self.lock_listener().clone();
        if let Some(listener) = listener {
            listener(&transition);
        }

        Some(transition)
    }

    /// Set one flag on top of the current vector
    pub fn append(&self, flag: S, intent: Intent, status: i32) -> Option<Transition<S>> {
        self.update(self.bits().with(flag), intent.mask(), status)
    }

    /// Clear one flag from the current vector
    pub fn remove(&self, flag: S, intent: Intent, status: i32) -> Option<Transition<S>> {
        self.update(self.bits().without(flag), intent.mask(), status)
    }

    /// Apply several flag values at once as a single transition
    pub fn apply(&self, changes: &[(S, bool)], intent: Intent, status: i32) -> Option<Transition<S>> {
        let new = changes
            .iter()
            .fold(self.bits(), |mask, (flag, value)| mask.set(*flag, *value));
        self.update(new, intent.mask(), status)
    }

    fn lock_times(&self) -> MutexGuard<'_, FlagTimes> {
        self.times.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<TransitionListener<S>>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: StateFlag> fmt::Debug for StateTracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTracker")
            .field("bits", &self.bits())
            .finish()
    }
}

fn set_indices(bits: u64) -> impl Iterator<Item = usize> {
    (0..MAX_FLAGS).filter(move |index| bits & (1u64 << index) != 0)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DeviceState, ManagerState};
    use crate::types::ManualTimeSource;
    use std::sync::atomic::AtomicUsize;

    fn counting_tracker() -> (Arc<StateTracker<DeviceState>>, Arc<AtomicUsize>) {
        let tracker = Arc::new(StateTracker::new(DeviceState::discovered_mask()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        tracker.set_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (tracker, calls)
    }

    #[test]
    fn test_identical_update_is_noop() {
        let (tracker, calls) = counting_tracker();
        let connected = StateMask::of(&[DeviceState::Discovered, DeviceState::Connected]);

        assert!(tracker
            .update(connected, StateMask::empty(), STATUS_NOT_APPLICABLE)
            .is_some());
        assert!(tracker
            .update(connected, StateMask::empty(), STATUS_NOT_APPLICABLE)
            .is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.bits(), connected);
    }

    #[test]
    fn test_intent_restricted_to_changed_bits() {
        let tracker = StateTracker::new(DeviceState::discovered_mask());
        let transition = tracker
            .apply(
                &[(DeviceState::Disconnected, false), (DeviceState::Connecting, true)],
                Intent::Intentional,
                STATUS_NOT_APPLICABLE,
            )
            .unwrap();

        assert_eq!(
            transition.intent(),
            StateMask::of(&[DeviceState::Disconnected, DeviceState::Connecting])
        );
        assert!(transition.was_intentional(DeviceState::Connecting));
        assert!(!transition.was_intentional(DeviceState::Discovered));
        assert!(transition.entered(DeviceState::Connecting));
        assert!(transition.exited(DeviceState::Disconnected));
    }

    #[test]
    fn test_listener_can_reenter_tracker() {
        let tracker = Arc::new(StateTracker::new(StateMask::from(ManagerState::Off)));
        let inner = tracker.clone();
        tracker.set_listener(move |transition| {
            assert_eq!(inner.bits(), transition.new_state());
            if transition.entered(ManagerState::TurningOn) {
                inner.update(
                    StateMask::from(ManagerState::On),
                    StateMask::empty(),
                    STATUS_NOT_APPLICABLE,
                );
            }
        });

        tracker.update(
            StateMask::from(ManagerState::TurningOn),
            Intent::Intentional.mask(),
            STATUS_NOT_APPLICABLE,
        );
        assert!(tracker.is(ManagerState::On));
    }

    #[test]
    fn test_queries() {
        let tracker = StateTracker::new(StateMask::of(&[
            DeviceState::Connected,
            DeviceState::Bonded,
        ]));
        assert!(tracker.is_any(StateMask::of(&[DeviceState::Bonded, DeviceState::Bonding])));
        assert!(tracker.is_all(StateMask::of(&[DeviceState::Bonded, DeviceState::Connected])));
        assert!(!tracker.is_all(StateMask::of(&[DeviceState::Bonded, DeviceState::Bonding])));
    }

    #[test]
    fn test_time_in_state() {
        let clock = ManualTimeSource::new();
        let tracker = StateTracker::with_time_source(
            StateMask::from(DeviceState::Disconnected),
            Arc::new(clock.clone()),
        );

        clock.advance(Duration::from_millis(300));
        assert_eq!(
            tracker.time_in_state(DeviceState::Disconnected),
            Duration::from_millis(300)
        );

        tracker.update(
            StateMask::from(DeviceState::Connected),
            StateMask::empty(),
            STATUS_NOT_APPLICABLE,
        );
        clock.advance(Duration::from_millis(100));

        assert_eq!(
            tracker.time_in_state(DeviceState::Connected),
            Duration::from_millis(100)
        );
        // last stay is frozen once the flag is cleared
        assert_eq!(
            tracker.time_in_state(DeviceState::Disconnected),
            Duration::from_millis(300)
        );
        assert_eq!(tracker.time_in_state(DeviceState::Bonded), Duration::ZERO);
    }

    #[test]
    fn test_transition_display() {
        let transition = Transition::new(
            StateMask::from(DeviceState::Connecting),
            StateMask::from(DeviceState::Connected),
            Intent::Intentional.mask(),
            0,
        );
        assert_eq!(
            transition.to_string(),
            "[CONNECTING] -> [CONNECTED] intentional [CONNECTING | CONNECTED] status 0"
        );
    }
}
