//! Operation payloads

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use super::{TaskKind, TaskPriority};
use crate::types::{DeviceId, TaskId, Target, TransactionId};

/// Attribute value, inline up to the default ATT payload size
pub type Payload = SmallVec<[u8; 20]>;

/// Connection interval preset requested from the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPriority {
    Balanced,
    High,
    LowPower,
}

/// A characteristic on a remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Characteristic {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl Characteristic {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// What a task asks the radio to do, with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    TurnOn,
    TurnOff {
        /// Issued by the library itself rather than the application
        implicit: bool,
    },
    ResolveCrashes {
        /// Runs as part of a full stack reset
        part_of_reset: bool,
    },
    Scan {
        /// Stop after this long; run until explicitly completed when `None`
        duration: Option<Duration>,
    },
    Connect {
        explicit: bool,
    },
    Disconnect {
        explicit: bool,
        /// A later connect to the same device softly cancels this disconnect
        cancellable_by_connect: bool,
    },
    DiscoverServices,
    Bond {
        explicit: bool,
    },
    Unbond,
    Read {
        target: Characteristic,
    },
    Write {
        target: Characteristic,
        data: Payload,
    },
    ToggleNotify {
        target: Characteristic,
        enable: bool,
    },
    ReadRssi,
    RequestMtu {
        mtu: u16,
    },
    RequestConnectionPriority {
        priority: ConnectionPriority,
    },
    ConnectServer {
        client: DeviceId,
    },
    DisconnectServer {
        client: DeviceId,
    },
    Delay {
        interval: Duration,
    },
    /// Holds the radio for a device while a transaction runs
    TransactionLock,
}

impl Operation {
    pub fn kind(&self) -> TaskKind {
        match self {
            Operation::TurnOn => TaskKind::TurnOn,
            Operation::TurnOff { .. } => TaskKind::TurnOff,
            Operation::ResolveCrashes { .. } => TaskKind::ResolveCrashes,
            Operation::Scan { .. } => TaskKind::Scan,
            Operation::Connect { .. } => TaskKind::Connect,
            Operation::Disconnect { .. } => TaskKind::Disconnect,
            Operation::DiscoverServices => TaskKind::DiscoverServices,
            Operation::Bond { .. } => TaskKind::Bond,
            Operation::Unbond => TaskKind::Unbond,
            Operation::Read { .. } => TaskKind::Read,
            Operation::Write { .. } => TaskKind::Write,
            Operation::ToggleNotify { .. } => TaskKind::ToggleNotify,
            Operation::ReadRssi => TaskKind::ReadRssi,
            Operation::RequestMtu { .. } => TaskKind::RequestMtu,
            Operation::RequestConnectionPriority { .. } => TaskKind::RequestConnectionPriority,
            Operation::ConnectServer { .. } => TaskKind::ConnectServer,
            Operation::DisconnectServer { .. } => TaskKind::DisconnectServer,
            Operation::Delay { .. } => TaskKind::Delay,
            Operation::TransactionLock => TaskKind::TransactionLock,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read { target } => write!(f, "READ {}", target),
            Operation::Write { target, data } => {
                write!(f, "WRITE {} ({} bytes)", target, data.len())
            }
            Operation::ToggleNotify { target, enable } => {
                write!(f, "TOGGLE_NOTIFY {} {}", target, if *enable { "on" } else { "off" })
            }
            Operation::RequestMtu { mtu } => write!(f, "REQUEST_MTU {}", mtu),
            Operation::ConnectServer { client } | Operation::DisconnectServer { client } => {
                write!(f, "{} {}", self.kind(), client)
            }
            Operation::Delay { interval } => write!(f, "DELAY {:?}", interval),
            other => f.write_str(other.kind().name()),
        }
    }
}

// ----------------------------------------------------------------------------
// Task Info
// ----------------------------------------------------------------------------

/// The immutable description of a task that ordering and cancellation
/// predicates inspect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub target: Target,
    pub priority: TaskPriority,
    /// Transaction this task belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionId>,
    pub operation: Operation,
}

impl TaskInfo {
    pub fn kind(&self) -> TaskKind {
        self.operation.kind()
    }

    pub fn is(&self, kind: TaskKind) -> bool {
        self.kind() == kind
    }

    pub fn same_target(&self, other: &TaskInfo) -> bool {
        self.target == other.target
    }

    /// Both tasks belong to the same transaction on the same target
    pub fn same_transaction(&self, other: &TaskInfo) -> bool {
        self.transaction.is_some()
            && self.transaction == other.transaction
            && self.same_target(other)
    }
}

impl fmt::Display for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({} {} {})",
            self.operation, self.id, self.target, self.priority
        )?;
        match self.transaction {
            Some(transaction) => write!(f, " in {}", transaction),
            None => Ok(()),
        }
    }
}
