//! Operation kind tags

use core::fmt;

use serde::{Deserialize, Serialize};

/// Which operation a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TurnOn,
    TurnOff,
    ResolveCrashes,
    Scan,
    Connect,
    Disconnect,
    DiscoverServices,
    Bond,
    Unbond,
    Read,
    Write,
    ToggleNotify,
    ReadRssi,
    RequestMtu,
    RequestConnectionPriority,
    ConnectServer,
    DisconnectServer,
    Delay,
    TransactionLock,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::TurnOn => "TURN_ON",
            TaskKind::TurnOff => "TURN_OFF",
            TaskKind::ResolveCrashes => "RESOLVE_CRASHES",
            TaskKind::Scan => "SCAN",
            TaskKind::Connect => "CONNECT",
            TaskKind::Disconnect => "DISCONNECT",
            TaskKind::DiscoverServices => "DISCOVER_SERVICES",
            TaskKind::Bond => "BOND",
            TaskKind::Unbond => "UNBOND",
            TaskKind::Read => "READ",
            TaskKind::Write => "WRITE",
            TaskKind::ToggleNotify => "TOGGLE_NOTIFY",
            TaskKind::ReadRssi => "READ_RSSI",
            TaskKind::RequestMtu => "REQUEST_MTU",
            TaskKind::RequestConnectionPriority => "REQUEST_CONNECTION_PRIORITY",
            TaskKind::ConnectServer => "CONNECT_SERVER",
            TaskKind::DisconnectServer => "DISCONNECT_SERVER",
            TaskKind::Delay => "DELAY",
            TaskKind::TransactionLock => "TXN_LOCK",
        }
    }

    /// Operations that can only run while the radio is on
    pub fn requires_radio(self) -> bool {
        !matches!(
            self,
            TaskKind::TurnOn | TaskKind::TurnOff | TaskKind::ResolveCrashes | TaskKind::Delay
        )
    }

    /// Operations that need a live connection to their device
    pub fn requires_connection(self) -> bool {
        matches!(
            self,
            TaskKind::DiscoverServices
                | TaskKind::Read
                | TaskKind::Write
                | TaskKind::ToggleNotify
                | TaskKind::ReadRssi
                | TaskKind::RequestMtu
                | TaskKind::RequestConnectionPriority
                | TaskKind::TransactionLock
        )
    }

    /// Reads, writes and the other requests served over a live connection
    pub fn is_transactionable(self) -> bool {
        self.requires_connection()
            && !matches!(self, TaskKind::DiscoverServices | TaskKind::TransactionLock)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
