//! Scheduler behaviour driven through live trackers
//!
//! These tests wire trackers, queue and adapter together the way the
//! runtime worker does: tracker listeners only record transitions, the
//! test loop forwards them to the queue, and task listeners run after
//! each queue call returns.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use radiolink_core::{
    operations, DeviceState, Intent, ManagerState, StateEvent, StateMask, Step, Target, Task,
    TaskCriteria, TaskKind, TaskPriority, TaskQueue, TaskState, Timeout, TimeoutConfig,
    STATUS_NOT_APPLICABLE,
};

use test_utils::{device, dispatch, outcome_log, OutcomeLog, RecordingAdapter, Trackers};

const TICK: Duration = Duration::from_millis(20);

fn logged(task: Task, log: &OutcomeLog) -> Task {
    let log = log.clone();
    task.with_listener(move |outcome| log.lock().unwrap().push(outcome.clone()))
}

/// Record every device transition so the loop can forward it to the queue
fn capture_device_events(trackers: &Trackers) -> Arc<Mutex<Vec<StateEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for (id, tracker) in &trackers.devices {
        let sink = events.clone();
        let id = *id;
        tracker.set_listener(move |transition| {
            sink.lock().unwrap().push(StateEvent::Device(id, *transition));
        });
    }
    events
}

fn forward(
    queue: &mut TaskQueue,
    events: &Arc<Mutex<Vec<StateEvent>>>,
    adapter: &mut RecordingAdapter,
    trackers: &Trackers,
) -> usize {
    let pending: Vec<StateEvent> = std::mem::take(&mut *events.lock().unwrap());
    pending
        .iter()
        .map(|event| dispatch(queue.on_transition(event, adapter, trackers)))
        .sum()
}

#[test]
fn test_connect_scenario() {
    let x = device(1);
    let trackers = Trackers::radio_on(&[x]);
    let events = capture_device_events(&trackers);
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    queue
        .submit(logged(operations::connect(x, true), &log))
        .unwrap();
    assert_eq!(queue.position_of(&TaskCriteria::kind(TaskKind::Connect)), Some(0));

    dispatch(queue.tick(TICK, &mut adapter, &trackers));
    let current = queue.current().unwrap();
    assert_eq!(current.state(), TaskState::Executing);
    assert_eq!(current.priority(), TaskPriority::Medium);
    assert_eq!(adapter.calls, vec!["connect"]);

    trackers.device(x).update(
        StateMask::from(DeviceState::Connected),
        Intent::Intentional.mask(),
        STATUS_NOT_APPLICABLE,
    );
    assert_eq!(forward(&mut queue, &events, &mut adapter, &trackers), 1);

    assert!(queue.is_idle());
    assert!(trackers.device(x).is(DeviceState::Connected));
    let outcomes = log.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].state, TaskState::Succeeded);
    assert_eq!(outcomes[0].target, Target::Device(x));
}

#[test]
fn test_priority_order_before_first_tick() {
    let x = device(2);
    let trackers = Trackers::radio_on(&[x]);
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    for priority in [TaskPriority::Low, TaskPriority::Critical, TaskPriority::Medium] {
        let task = operations::delay(Duration::from_millis(10)).with_priority(priority);
        queue.submit(logged(task, &log)).unwrap();
    }

    for _ in 0..10 {
        dispatch(queue.tick(TICK, &mut adapter, &trackers));
    }

    let order: Vec<TaskPriority> = log.lock().unwrap().iter().map(|o| o.priority).collect();
    assert_eq!(
        order,
        vec![TaskPriority::Critical, TaskPriority::Medium, TaskPriority::Low]
    );
}

#[test]
fn test_turn_off_cancels_connect_before_arming() {
    let x = device(3);
    let trackers = Trackers::radio_on(&[x]);
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    queue.submit(logged(operations::connect(x, true), &log)).unwrap();
    dispatch(queue.tick(TICK, &mut adapter, &trackers));

    dispatch(queue.submit(logged(operations::turn_off(false), &log)).unwrap());
    {
        let outcomes = log.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].kind, TaskKind::Connect);
        assert_eq!(outcomes[0].state, TaskState::Cancelled);
    }

    dispatch(queue.tick(TICK, &mut adapter, &trackers));
    assert!(queue.is_current(&TaskCriteria::kind(TaskKind::TurnOff)));
    assert_eq!(adapter.calls, vec!["connect", "disable_radio"]);
}

#[test]
fn test_timeout_then_advance() {
    let x = device(4);
    let trackers = Trackers::radio_on(&[x]);
    let log = outcome_log();
    let timeouts = TimeoutConfig::default().with_override(
        TaskKind::Connect,
        Some(Duration::from_millis(200)),
    );
    let mut queue = TaskQueue::new(timeouts, None);
    let mut adapter = RecordingAdapter::new();

    queue.submit(logged(operations::connect(x, true), &log)).unwrap();
    queue
        .submit(logged(operations::delay(Duration::from_secs(1)), &log))
        .unwrap();

    let mut ticks = 0;
    while log.lock().unwrap().is_empty() {
        dispatch(queue.tick(TICK, &mut adapter, &trackers));
        ticks += 1;
        assert!(ticks < 100, "connect never timed out");
    }

    // one tick to arm, then 200ms of executing time
    assert_eq!(ticks, 11);
    assert_eq!(log.lock().unwrap()[0].state, TaskState::TimedOut);
    assert!(queue.is_current(&TaskCriteria::kind(TaskKind::Delay)));
}

#[test]
fn test_explicit_timeout_beats_override() {
    let x = device(5);
    let trackers = Trackers::radio_on(&[x]);
    let timeouts = TimeoutConfig::default().with_override(TaskKind::ReadRssi, None);
    let mut queue = TaskQueue::new(timeouts, None);
    let mut adapter = RecordingAdapter::new();

    let task = Task::builder(Target::Device(x), radiolink_core::Operation::ReadRssi)
        .precondition(radiolink_core::policy::always_ready)
        .timeout(Timeout::After(Duration::from_millis(40)))
        .build();
    queue.submit(task).unwrap();

    queue.tick(TICK, &mut adapter, &trackers);
    queue.tick(TICK, &mut adapter, &trackers);
    let resolved = queue.tick(TICK, &mut adapter, &trackers);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].outcome().state, TaskState::TimedOut);
}

#[test]
fn test_turn_off_while_off_is_redundant() {
    let trackers = Trackers::radio_on(&[]);
    trackers.manager.update(
        StateMask::from(ManagerState::Off),
        Intent::Unintentional.mask(),
        STATUS_NOT_APPLICABLE,
    );
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    queue.submit(logged(operations::turn_off(false), &log)).unwrap();
    dispatch(queue.tick(TICK, &mut adapter, &trackers));

    assert!(adapter.calls.is_empty());
    assert_eq!(log.lock().unwrap()[0].state, TaskState::Redundant);
    assert_eq!(queue.stats().redundant, 1);
}

#[test]
fn test_unintentional_disconnect_fails_connect() {
    let x = device(6);
    let trackers = Trackers::radio_on(&[x]);
    let events = capture_device_events(&trackers);
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    queue.submit(logged(operations::connect(x, true), &log)).unwrap();
    dispatch(queue.tick(TICK, &mut adapter, &trackers));

    trackers.device(x).apply(
        &[(DeviceState::Connecting, true), (DeviceState::Disconnected, false)],
        Intent::Intentional,
        STATUS_NOT_APPLICABLE,
    );
    trackers.device(x).apply(
        &[(DeviceState::Connecting, false), (DeviceState::Disconnected, true)],
        Intent::Unintentional,
        133,
    );
    forward(&mut queue, &events, &mut adapter, &trackers);

    let outcomes = log.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].state, TaskState::Failed);
}

#[test]
fn test_intentional_disconnect_fails_connect_without_timeout() {
    let x = device(9);
    let trackers = Trackers::radio_on(&[x]);
    let events = capture_device_events(&trackers);
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    queue.submit(logged(operations::connect(x, true), &log)).unwrap();
    dispatch(queue.tick(TICK, &mut adapter, &trackers));

    trackers.device(x).apply(
        &[(DeviceState::Connecting, true), (DeviceState::Disconnected, false)],
        Intent::Intentional,
        STATUS_NOT_APPLICABLE,
    );
    trackers.device(x).apply(
        &[(DeviceState::Connecting, false), (DeviceState::Disconnected, true)],
        Intent::Intentional,
        STATUS_NOT_APPLICABLE,
    );
    forward(&mut queue, &events, &mut adapter, &trackers);

    let outcomes = log.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].state, TaskState::Failed);
    assert!(queue.is_idle());
}

#[test]
fn test_connected_transaction_waits_for_connection() {
    let x = device(7);
    let mut trackers = Trackers::radio_on(&[x]);
    let events = capture_device_events(&trackers);
    let log = outcome_log();
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    trackers
        .device(x)
        .apply(&[(DeviceState::Connecting, true)], Intent::Intentional, STATUS_NOT_APPLICABLE);
    events.lock().unwrap().clear();

    queue.submit(logged(operations::read_rssi(x), &log)).unwrap();
    dispatch(queue.tick(TICK, &mut adapter, &trackers));
    assert!(queue.current().is_none());
    assert!(queue.is_queued(&TaskCriteria::kind(TaskKind::ReadRssi)));

    trackers.device(x).apply(
        &[(DeviceState::Connecting, false), (DeviceState::Connected, true)],
        Intent::Intentional,
        STATUS_NOT_APPLICABLE,
    );
    trackers.connections.insert(x);
    forward(&mut queue, &events, &mut adapter, &trackers);
    dispatch(queue.tick(TICK, &mut adapter, &trackers));
    assert!(queue.is_current(&TaskCriteria::kind(TaskKind::ReadRssi)));

    dispatch(queue.complete(
        &TaskCriteria::kind(TaskKind::ReadRssi).on(x),
        Step::Succeed,
        &mut adapter,
        &trackers,
    ));
    assert_eq!(log.lock().unwrap()[0].state, TaskState::Succeeded);
    assert_eq!(adapter.calls, vec!["read_rssi"]);
}

#[test]
fn test_listener_may_submit_follow_up() {
    let x = device(8);
    let trackers = Trackers::radio_on(&[x]);
    let follow_ups: Arc<Mutex<Vec<Task>>> = Arc::new(Mutex::new(Vec::new()));
    let mut queue = TaskQueue::default();
    let mut adapter = RecordingAdapter::new();

    let sink = follow_ups.clone();
    let first = operations::delay(Duration::ZERO).with_listener(move |outcome| {
        if outcome.is_success() {
            sink.lock().unwrap().push(operations::delay(Duration::ZERO));
        }
    });
    queue.submit(first).unwrap();
    dispatch(queue.tick(TICK, &mut adapter, &trackers));

    let pending: Vec<Task> = std::mem::take(&mut *follow_ups.lock().unwrap());
    assert_eq!(pending.len(), 1);
    for task in pending {
        queue.submit(task).unwrap();
    }
    let resolved = queue.tick(TICK, &mut adapter, &trackers);
    assert_eq!(resolved.len(), 1);
    assert_eq!(queue.stats().succeeded, 2);
}
