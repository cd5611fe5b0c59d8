//! Scripted scenarios against the simulated radio
//!
//! Each scenario starts a live worker over [`SimulatedRadio`], submits a
//! fixed sequence of tasks and collects every outcome. The outcomes are then
//! checked against the kinds and ending states the scenario expects.

use std::time::Duration;

use radiolink_core::{
    operations, Characteristic, DeviceId, Task, TaskCriteria, TaskId, TaskKind, TaskOutcome,
    TaskPriority, TaskState,
};
use radiolink_runtime::{RadioHandle, RuntimeBuilder, RuntimeStats};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::Scenario;
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::simulate::SimulatedRadio;

/// Peer that answers every request
pub const PERIPHERAL: DeviceId = DeviceId::new([0x0C, 0x1A, 0x55, 0x00, 0x00, 0x01]);
/// Peer that never answers a connection attempt
pub const UNREACHABLE: DeviceId = DeviceId::new([0x0C, 0x1A, 0x55, 0x00, 0x00, 0x02]);

const HEART_RATE: Characteristic = Characteristic {
    service: Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb),
    characteristic: Uuid::from_u128(0x0000_2a39_0000_1000_8000_0080_5f9b_34fb),
};

/// Upper bound on the wait for any single outcome
const OUTCOME_DEADLINE: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ----------------------------------------------------------------------------
// Report
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<TaskOutcome>,
    pub stats: RuntimeStats,
    #[serde(skip)]
    expected: Vec<(TaskKind, TaskState)>,
}

impl ScenarioReport {
    /// Compare outcomes, in resolution order, with what the scenario expects
    pub fn check(&self) -> Result<()> {
        let actual: Vec<(TaskKind, TaskState)> = self
            .outcomes
            .iter()
            .map(|outcome| (outcome.kind, outcome.state))
            .collect();
        if actual == self.expected {
            Ok(())
        } else {
            Err(CliError::scenario(format!(
                "expected {:?}, got {:?}",
                self.expected, actual
            )))
        }
    }
}

// ----------------------------------------------------------------------------
// Runner
// ----------------------------------------------------------------------------

struct Session {
    handle: RadioHandle,
    outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
    seen: Vec<TaskOutcome>,
}

impl Session {
    /// Submit `task` and wait until it resolves
    async fn run(&mut self, task: Task) -> Result<TaskOutcome> {
        let id = self.handle.submit(task).await?;
        self.wait_for(id).await
    }

    async fn wait_for(&mut self, id: TaskId) -> Result<TaskOutcome> {
        if let Some(outcome) = self.seen.iter().find(|outcome| outcome.id == id) {
            return Ok(outcome.clone());
        }
        loop {
            let outcome = tokio::time::timeout(OUTCOME_DEADLINE, self.outcomes.recv())
                .await
                .map_err(|_| CliError::scenario(format!("{} never resolved", id)))?
                .ok_or_else(|| CliError::scenario("worker stopped early"))?;
            info!(%outcome, "Task resolved");
            self.seen.push(outcome.clone());
            if outcome.id == id {
                return Ok(outcome);
            }
        }
    }

    async fn wait_until_executing(&self, id: TaskId) -> Result<()> {
        let deadline = tokio::time::Instant::now() + OUTCOME_DEADLINE;
        loop {
            let snapshot = self.handle.find(TaskCriteria::id(id)).await?;
            match snapshot {
                Some(snapshot) if snapshot.state == TaskState::Executing => return Ok(()),
                Some(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await
                }
                _ => return Err(CliError::scenario(format!("{} never started", id))),
            }
        }
    }

    /// Submit every task in one worker step so none is armed early
    fn submit_batch(&self, tasks: Vec<Task>) -> Result<Vec<TaskId>> {
        let ids = tasks.iter().map(Task::id).collect();
        self.handle.post(move |worker| {
            for task in tasks {
                if let Err(err) = worker.submit(task) {
                    warn!(error = %err, "Batch submission rejected");
                }
            }
        })?;
        Ok(ids)
    }
}

pub async fn run(
    scenario: Scenario,
    config: &AppConfig,
    latency_ms: Option<u64>,
) -> Result<ScenarioReport> {
    let latency = Duration::from_millis(latency_ms.unwrap_or(config.simulator.latency_ms));
    let mut unreachable = config.simulator.unreachable_devices()?;
    unreachable.push(UNREACHABLE);

    let mut radio = config.radio.clone().with_auto_tick(true);
    if scenario == Scenario::Timeout {
        let connect_timeout = (latency * 5).max(Duration::from_millis(100));
        radio.timeouts = radio
            .timeouts
            .with_override(TaskKind::Connect, Some(connect_timeout));
    }

    let (sender, outcomes) = mpsc::unbounded_channel();
    let mut runtime = RuntimeBuilder::new()
        .with_config(radio)
        .on_outcome(move |outcome| {
            let _ = sender.send(outcome.clone());
        })
        .build_and_start(move |handle| {
            Box::new(SimulatedRadio::new(handle, latency).with_unreachable(unreachable))
        })
        .await?;

    info!(?scenario, ?latency, "Running scenario");
    let mut session = Session {
        handle: runtime.handle(),
        outcomes,
        seen: Vec::new(),
    };
    let expected = script(scenario, &mut session, latency).await?;

    let stats = session.handle.stats().await?;
    runtime.shutdown().await?;

    Ok(ScenarioReport {
        outcomes: session.seen,
        stats,
        expected,
    })
}

async fn script(
    scenario: Scenario,
    session: &mut Session,
    latency: Duration,
) -> Result<Vec<(TaskKind, TaskState)>> {
    use TaskKind::*;
    use TaskState::*;

    match scenario {
        Scenario::Connect => {
            session.run(operations::turn_on()).await?;
            session.run(operations::connect(PERIPHERAL, true)).await?;
            session.run(operations::discover_services(PERIPHERAL)).await?;
            session.run(operations::read_rssi(PERIPHERAL)).await?;
            session
                .run(operations::write(PERIPHERAL, HEART_RATE, b"\x01\x00"))
                .await?;
            session.run(operations::read(PERIPHERAL, HEART_RATE)).await?;
            session
                .run(operations::disconnect(PERIPHERAL, true, false))
                .await?;
            Ok(vec![
                (TurnOn, Succeeded),
                (Connect, Succeeded),
                (DiscoverServices, Succeeded),
                (ReadRssi, Succeeded),
                (Write, Succeeded),
                (Read, Succeeded),
                (Disconnect, Succeeded),
            ])
        }
        Scenario::Priority => {
            let priorities = [
                TaskPriority::Low,
                TaskPriority::Critical,
                TaskPriority::Medium,
                TaskPriority::High,
            ];
            let tasks = priorities
                .iter()
                .map(|priority| operations::delay(latency).with_priority(*priority))
                .collect();
            let ids = session.submit_batch(tasks)?;
            for id in ids {
                session.wait_for(id).await?;
            }
            let order: Vec<TaskPriority> =
                session.seen.iter().map(|outcome| outcome.priority).collect();
            if order.windows(2).any(|pair| pair[0] < pair[1]) {
                return Err(CliError::scenario(format!(
                    "tasks ran out of priority order: {:?}",
                    order
                )));
            }
            Ok(vec![(Delay, Succeeded); 4])
        }
        Scenario::Preempt => {
            session.run(operations::turn_on()).await?;
            let connect = session
                .handle
                .submit(operations::connect(UNREACHABLE, true))
                .await?;
            session.wait_until_executing(connect).await?;
            session.run(operations::turn_off(false)).await?;
            session.wait_for(connect).await?;
            Ok(vec![
                (TurnOn, Succeeded),
                (Connect, Cancelled),
                (TurnOff, Succeeded),
            ])
        }
        Scenario::Timeout => {
            session.run(operations::turn_on()).await?;
            session.run(operations::connect(UNREACHABLE, true)).await?;
            Ok(vec![(TurnOn, Succeeded), (Connect, TimedOut)])
        }
        Scenario::Redundant => {
            session.run(operations::turn_on()).await?;
            session.run(operations::turn_on()).await?;
            session.run(operations::connect(PERIPHERAL, true)).await?;
            session.run(operations::connect(PERIPHERAL, true)).await?;
            Ok(vec![
                (TurnOn, Succeeded),
                (TurnOn, Redundant),
                (Connect, Succeeded),
                (Connect, Redundant),
            ])
        }
    }
}
