//! Integration tests for the spawned radio worker
//!
//! Every test runs a hand-ticked worker and talks to it only through
//! `RadioHandle`, the way a platform binding would.

use std::sync::{Arc, Mutex, OnceLock};

use futures::future::join_all;
use radiolink_core::{AdapterCall, MockAdapter};
use radiolink_runtime::{
    create_test_runtime, operations, DeviceId, DeviceState, Intent, ManagerState, RadioConfig,
    RadioHandle, RuntimeBuilder, RuntimeError, StateMask, Task, TaskCriteria, TaskKind,
    TaskOutcome, TaskState,
};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tokio_test::assert_ok;

const TICK: Duration = Duration::from_millis(5);
const WAIT: Duration = Duration::from_secs(1);

fn device(n: u8) -> DeviceId {
    DeviceId::new([0x10, 0, 0, 0, 0, n])
}

fn reported(task: Task) -> (Task, oneshot::Receiver<TaskOutcome>) {
    let (tx, rx) = oneshot::channel();
    let task = task.with_listener(move |outcome| {
        let _ = tx.send(outcome.clone());
    });
    (task, rx)
}

async fn query<T, F>(handle: &RadioHandle, read: F) -> T
where
    T: Send + 'static,
    F: FnOnce(&mut radiolink_runtime::RadioWorker) -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    handle
        .post(move |worker| {
            let _ = tx.send(read(worker));
        })
        .expect("worker should accept callbacks");
    timeout(WAIT, rx)
        .await
        .expect("callback did not run")
        .expect("callback dropped")
}

#[tokio::test]
async fn test_connect_through_handle() {
    let mock = MockAdapter::new();
    let adapter = mock.clone();
    let mut runtime = create_test_runtime(move |_| Box::new(adapter))
        .await
        .expect("Failed to start runtime");
    let handle = runtime.handle();
    let x = device(1);

    let (task, outcome) = reported(operations::connect(x, true));
    handle.submit(task).await.unwrap();
    handle.tick(TICK).await.unwrap();
    assert_eq!(mock.calls(), vec![AdapterCall::Connect(x)]);

    handle
        .report_device_state(x, StateMask::from(DeviceState::Connected), Intent::Intentional, 0)
        .unwrap();

    let outcome = timeout(WAIT, outcome).await.unwrap().unwrap();
    assert_eq!(outcome.state, TaskState::Succeeded);
    assert_eq!(outcome.kind, TaskKind::Connect);
    assert_eq!(
        handle.device_state(x),
        Some(StateMask::from(DeviceState::Connected))
    );
    assert_eq!(handle.known_devices(), vec![x]);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.queue.succeeded, 1);
    assert_eq!(stats.worker.transitions_observed, 1);

    runtime.shutdown().await.unwrap();
    assert!(!runtime.is_running());
}

#[tokio::test]
async fn test_device_listener_reads_state_reentrantly() {
    let cell: Arc<OnceLock<RadioHandle>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let listener_cell = cell.clone();
    let listener_seen = seen.clone();
    let mut runtime = RuntimeBuilder::testing()
        .with_initial_manager_state(StateMask::from(ManagerState::On))
        .on_device_transition(move |device, transition| {
            let observed = listener_cell
                .get()
                .and_then(|handle| handle.device_state(device));
            listener_seen
                .lock()
                .unwrap()
                .push((observed, transition.new_state()));
        })
        .build_and_start(|_| Box::new(MockAdapter::new()))
        .await
        .unwrap();
    let handle = runtime.handle();
    cell.set(handle.clone()).unwrap();

    let x = device(2);
    handle
        .report_device_state(x, StateMask::from(DeviceState::Connected), Intent::Intentional, 0)
        .unwrap();
    // round trip so the report above has been processed
    handle.snapshot().await.unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Some(seen[0].1));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delayed_callback_and_removal() {
    let mut runtime = create_test_runtime(|_| Box::new(MockAdapter::new()))
        .await
        .unwrap();
    let handle = runtime.handle();
    let kept = device(3);
    let dropped = device(4);

    handle
        .post_delayed(Duration::from_millis(10), move |worker| {
            worker.set_connection_handle(kept, true)
        })
        .unwrap();
    let removed = handle
        .post_delayed(Duration::from_millis(10), move |worker| {
            worker.set_connection_handle(dropped, true)
        })
        .unwrap();
    handle.remove_callback(removed).unwrap();

    handle.tick(TICK).await.unwrap();
    assert!(!query(&handle, move |worker| worker.has_connection(kept)).await);

    handle.tick(TICK).await.unwrap();
    assert!(query(&handle, move |worker| worker.has_connection(kept)).await);
    assert!(!query(&handle, move |worker| worker.has_connection(dropped)).await);
    assert_eq!(query(&handle, |worker| worker.pending_callbacks()).await, 0);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupted_scan_is_requeued() {
    let mock = MockAdapter::new();
    let adapter = mock.clone();
    let mut runtime = create_test_runtime(move |_| Box::new(adapter))
        .await
        .unwrap();
    let handle = runtime.handle();

    handle.submit(operations::scan(None)).await.unwrap();
    handle.tick(TICK).await.unwrap();
    assert_eq!(mock.calls(), vec![AdapterCall::StartScan(None)]);

    // the scan is stopped and, being the only task, armed again at once
    assert!(handle
        .interrupt(TaskCriteria::kind(TaskKind::Scan))
        .await
        .unwrap());

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, TaskState::Executing);
    assert_eq!(
        mock.calls(),
        vec![
            AdapterCall::StartScan(None),
            AdapterCall::StopScan,
            AdapterCall::StartScan(None)
        ]
    );
    assert_eq!(handle.stats().await.unwrap().queue.interrupted, 1);

    runtime.shutdown().await.unwrap();
    assert_eq!(mock.count("stop_scan"), 2);
}

#[tokio::test]
async fn test_turn_off_replaces_scan_without_tick() {
    let mock = MockAdapter::new();
    let adapter = mock.clone();
    let mut runtime = create_test_runtime(move |_| Box::new(adapter))
        .await
        .unwrap();
    let handle = runtime.handle();

    let (scan, scan_outcome) = reported(operations::scan(None));
    handle.submit(scan).await.unwrap();
    handle.tick(TICK).await.unwrap();

    handle.submit(operations::turn_off(false)).await.unwrap();
    let scan_outcome = timeout(WAIT, scan_outcome).await.unwrap().unwrap();
    assert_eq!(scan_outcome.state, TaskState::Cancelled);

    let current = handle.find(TaskCriteria::kind(TaskKind::TurnOff)).await.unwrap();
    assert_eq!(current.map(|snapshot| snapshot.state), Some(TaskState::Executing));
    assert_eq!(
        mock.calls(),
        vec![
            AdapterCall::StartScan(None),
            AdapterCall::StopScan,
            AdapterCall::DisableRadio
        ]
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_submission_reports_scheduler_error() {
    let mut runtime = create_test_runtime(|_| Box::new(MockAdapter::new()))
        .await
        .unwrap();
    let handle = runtime.handle();

    let first = operations::delay(Duration::from_secs(1));
    let id = first.id();
    handle.submit(first).await.unwrap();

    let template = operations::delay(Duration::from_secs(1));
    let duplicate = Task::builder(template.target(), template.info().operation.clone())
        .id(id)
        .build();
    let err = handle.submit(duplicate).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Scheduler(_)));

    let found = handle.find(TaskCriteria::id(id)).await.unwrap();
    assert_eq!(found.map(|snapshot| snapshot.info.id), Some(id));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_resolves_pending_tasks() {
    let mut runtime = create_test_runtime(|_| Box::new(MockAdapter::new()))
        .await
        .unwrap();
    let handle = runtime.handle();

    let (running, running_outcome) = reported(operations::delay(Duration::from_secs(5)));
    let (queued, queued_outcome) = reported(operations::delay(Duration::from_secs(5)));
    handle.submit(running).await.unwrap();
    handle.tick(TICK).await.unwrap();
    handle.submit(queued).await.unwrap();

    runtime.shutdown().await.unwrap();

    let running_outcome = timeout(WAIT, running_outcome).await.unwrap().unwrap();
    let queued_outcome = timeout(WAIT, queued_outcome).await.unwrap().unwrap();
    assert_eq!(running_outcome.state, TaskState::Cancelled);
    assert_eq!(queued_outcome.state, TaskState::ClearedFromQueue);

    let err = handle.enqueue(operations::delay(Duration::ZERO)).unwrap_err();
    assert!(err.is_unrecoverable());
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_auto_tick_drives_queue() {
    let config = RadioConfig::low_latency();
    let mut runtime = RuntimeBuilder::new()
        .with_config(config)
        .build_and_start(|_| Box::new(MockAdapter::new()))
        .await
        .unwrap();
    let handle = runtime.handle();

    let (task, outcome) = reported(operations::delay(Duration::from_millis(20)));
    handle.submit(task).await.unwrap();

    let outcome = timeout(WAIT, outcome).await.unwrap().unwrap();
    assert!(outcome.is_success());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submitters_all_resolve() {
    let mut runtime = create_test_runtime(|_| Box::new(MockAdapter::new()))
        .await
        .unwrap();
    let handle = runtime.handle();

    let submissions = (0..8).map(|_| {
        let handle = handle.clone();
        async move { handle.submit(operations::delay(Duration::ZERO)).await }
    });
    for result in join_all(submissions).await {
        assert_ok!(result);
    }

    for _ in 0..8 {
        handle.tick(TICK).await.unwrap();
    }
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.queue.submitted, 8);
    assert_eq!(stats.queue.succeeded, 8);
    assert!(handle.snapshot().await.unwrap().is_empty());

    runtime.shutdown().await.unwrap();
}
