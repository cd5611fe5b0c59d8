//! Task priority tiers

use core::fmt;

use serde::{Deserialize, Serialize};

/// Priority tier, ordered lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Background work such as scanning
    Trivial,
    Low,
    /// Ordinary reads, writes and connects
    Medium,
    High,
    /// Radio power changes and crash recovery
    Critical,
    /// Reads and writes inside a held transaction
    AtomicTransaction,
    Unbond,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 7] = [
        TaskPriority::Trivial,
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Critical,
        TaskPriority::AtomicTransaction,
        TaskPriority::Unbond,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskPriority::Trivial => "TRIVIAL",
            TaskPriority::Low => "LOW",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
            TaskPriority::AtomicTransaction => "ATOMIC_TRANSACTION",
            TaskPriority::Unbond => "UNBOND",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
