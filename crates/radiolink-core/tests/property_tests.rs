//! Property-based tests for the scheduler and state tracker
//!
//! Random interleavings of submissions, ticks, completions and
//! cancellations must never put two tasks on the radio at once, and every
//! submitted task must report exactly one outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use radiolink_core::{
    operations, DeviceId, DeviceState, Intent, StateMask, StateSnapshot, StateTracker, Step,
    Target, Task, TaskCriteria, TaskId, TaskPriority, TaskQueue, TaskState, STATUS_NOT_APPLICABLE,
};

use test_utils::{dispatch, RecordingAdapter};

#[derive(Debug, Clone)]
enum Action {
    Submit { kind: u8, device: u8, priority: TaskPriority },
    Tick(u64),
    Complete(Step),
    CancelDevice(u8),
    Interrupt,
}

fn arb_priority() -> impl Strategy<Value = TaskPriority> {
    prop::sample::select(TaskPriority::ALL.to_vec())
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop::sample::select(vec![
        Step::Continue,
        Step::Succeed,
        Step::Fail,
        Step::FailImmediately,
        Step::Redundant,
        Step::Interrupt,
    ])
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0u8..8, 0u8..3, arb_priority())
            .prop_map(|(kind, device, priority)| Action::Submit { kind, device, priority }),
        4 => (1u64..200).prop_map(Action::Tick),
        2 => arb_step().prop_map(Action::Complete),
        1 => (0u8..3).prop_map(Action::CancelDevice),
        1 => Just(Action::Interrupt),
    ]
}

fn device(n: u8) -> DeviceId {
    DeviceId::new([0xE0, 0, 0, 0, 0, n])
}

fn build(kind: u8, n: u8) -> Task {
    let device = device(n);
    match kind {
        0 => operations::connect(device, true),
        1 => operations::disconnect(device, true, true),
        2 => operations::read_rssi(device),
        3 => operations::bond(device, true),
        4 => operations::scan(Some(Duration::from_millis(300))),
        5 => operations::turn_off(false),
        6 => operations::delay(Duration::from_millis(50)),
        _ => operations::request_mtu(device, 247),
    }
}

fn snapshot_view() -> StateSnapshot {
    (0..3).fold(StateSnapshot::radio_on(), |view, n| {
        view.with_device(device(n), DeviceState::discovered_mask())
            .with_connected(device(n))
    })
}

proptest! {
    /// Property: at most one task is ever on the radio
    #[test]
    fn single_flight(actions in prop::collection::vec(arb_action(), 1..80)) {
        let mut queue = TaskQueue::default();
        let mut adapter = RecordingAdapter::new();
        let view = snapshot_view();

        for action in actions {
            match action {
                Action::Submit { kind, device, priority } => {
                    let task = build(kind, device).with_priority(priority);
                    dispatch(queue.submit(task).expect("fresh tasks are accepted"));
                }
                Action::Tick(ms) => {
                    dispatch(queue.tick(Duration::from_millis(ms), &mut adapter, &view));
                }
                Action::Complete(step) => {
                    dispatch(queue.complete(&TaskCriteria::any(), step, &mut adapter, &view));
                }
                Action::CancelDevice(n) => {
                    dispatch(queue.cancel(&TaskCriteria::target(Target::Device(device(n)))));
                }
                Action::Interrupt => {
                    queue.interrupt(&TaskCriteria::any());
                }
            }

            let snapshot = queue.snapshot();
            let on_radio = snapshot
                .iter()
                .filter(|task| matches!(task.state, TaskState::Armed | TaskState::Executing))
                .count();
            prop_assert!(on_radio <= 1);
            if let Some(current) = queue.current() {
                prop_assert_eq!(snapshot[0].info.id, current.id());
            }
            prop_assert!(snapshot.iter().skip(usize::from(queue.current().is_some()))
                .all(|task| task.state.is_queued()));
        }
    }

    /// Property: every submitted task reports exactly one ending state
    #[test]
    fn exactly_once_reporting(actions in prop::collection::vec(arb_action(), 1..80)) {
        let reports: Arc<Mutex<HashMap<TaskId, Vec<TaskState>>>> = Arc::default();
        let mut submitted = Vec::new();
        let mut queue = TaskQueue::default();
        let mut adapter = RecordingAdapter::new();
        let view = snapshot_view();

        for action in actions {
            match action {
                Action::Submit { kind, device, priority } => {
                    let sink = reports.clone();
                    let task = build(kind, device)
                        .with_priority(priority)
                        .with_listener(move |outcome| {
                            sink.lock().unwrap().entry(outcome.id).or_default().push(outcome.state);
                        });
                    submitted.push(task.id());
                    dispatch(queue.submit(task).expect("fresh tasks are accepted"));
                }
                Action::Tick(ms) => {
                    dispatch(queue.tick(Duration::from_millis(ms), &mut adapter, &view));
                }
                Action::Complete(step) => {
                    dispatch(queue.complete(&TaskCriteria::any(), step, &mut adapter, &view));
                }
                Action::CancelDevice(n) => {
                    dispatch(queue.cancel(&TaskCriteria::target(Target::Device(device(n)))));
                }
                Action::Interrupt => {
                    queue.interrupt(&TaskCriteria::any());
                }
            }
        }
        dispatch(queue.clear_all());

        let reports = reports.lock().unwrap();
        prop_assert!(queue.is_idle());
        prop_assert_eq!(reports.len(), submitted.len());
        for id in &submitted {
            let states = &reports[id];
            prop_assert_eq!(states.len(), 1);
            prop_assert!(states[0].is_terminal());
        }
        prop_assert_eq!(queue.stats().resolved(), submitted.len() as u64);
    }

    /// Property: a started scan is stopped before the radio does anything
    /// else, however the scan task left the radio
    #[test]
    fn scan_stopped_before_next_call(actions in prop::collection::vec(arb_action(), 1..80)) {
        let mut queue = TaskQueue::default();
        let mut adapter = RecordingAdapter::new();
        let view = snapshot_view();

        for action in actions {
            match action {
                Action::Submit { kind, device, priority } => {
                    let task = build(kind, device).with_priority(priority);
                    dispatch(queue.submit(task).expect("fresh tasks are accepted"));
                }
                Action::Tick(ms) => {
                    dispatch(queue.tick(Duration::from_millis(ms), &mut adapter, &view));
                }
                Action::Complete(step) => {
                    dispatch(queue.complete(&TaskCriteria::any(), step, &mut adapter, &view));
                }
                Action::CancelDevice(n) => {
                    dispatch(queue.cancel(&TaskCriteria::target(Target::Device(device(n)))));
                    dispatch(queue.advance(&mut adapter, &view));
                }
                Action::Interrupt => {
                    queue.interrupt(&TaskCriteria::any());
                }
            }
        }
        dispatch(queue.clear_all());
        dispatch(queue.advance(&mut adapter, &view));

        let mut scanning = false;
        for call in &adapter.calls {
            match *call {
                "start_scan" => {
                    prop_assert!(!scanning);
                    scanning = true;
                }
                "stop_scan" => scanning = false,
                _ => prop_assert!(!scanning, "{} issued during a scan", call),
            }
        }
        prop_assert!(!scanning);
    }

    /// Property: without preemption the queue stays sorted by priority and
    /// keeps submission order within a target
    #[test]
    fn queue_order(entries in prop::collection::vec((0u8..3, arb_priority()), 1..40)) {
        let mut queue = TaskQueue::default();
        let mut order = Vec::new();
        for (n, priority) in entries {
            let task = operations::read_rssi(device(n)).with_priority(priority);
            order.push(task.id());
            queue.submit(task).expect("fresh tasks are accepted");
        }

        let snapshot = queue.snapshot();
        for pair in snapshot.windows(2) {
            prop_assert!(pair[0].info.priority >= pair[1].info.priority);
            if pair[0].info.target == pair[1].info.target
                && pair[0].info.priority == pair[1].info.priority
            {
                let first = order.iter().position(|id| *id == pair[0].info.id);
                let second = order.iter().position(|id| *id == pair[1].info.id);
                prop_assert!(first < second);
            }
        }
    }

    /// Property: repeating a vector never fires the listener again
    #[test]
    fn tracker_update_idempotent(
        initial in any::<u16>(),
        updates in prop::collection::vec((any::<u16>(), any::<bool>()), 1..30),
    ) {
        let mask = |raw: u16| StateMask::<DeviceState>::from_bits(u64::from(raw & 0x0FFF));
        let tracker = StateTracker::new(mask(initial));
        let fired = Arc::new(Mutex::new(0usize));
        let counter = fired.clone();
        tracker.set_listener(move |_| *counter.lock().unwrap() += 1);

        let mut expected = 0;
        for (raw, intentional) in updates {
            let intent = Intent::from(intentional).mask();
            let changed = tracker.bits() != mask(raw);
            let first = tracker.update(mask(raw), intent, STATUS_NOT_APPLICABLE);
            prop_assert_eq!(first.is_some(), changed);
            if let Some(transition) = first {
                prop_assert!(transition.changed().contains_all(transition.intent()));
                expected += 1;
            }
            prop_assert!(tracker.update(mask(raw), intent, STATUS_NOT_APPLICABLE).is_none());
            prop_assert_eq!(tracker.bits(), mask(raw));
        }
        prop_assert_eq!(*fired.lock().unwrap(), expected);
    }
}
