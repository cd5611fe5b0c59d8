//! Core identifier types for radiolink
//!
//! Addresses, target references and timestamps shared by the scheduler,
//! the state trackers and the adapter boundary.

use core::fmt;
use core::ops::{Add, Deref, Sub};
use core::str::FromStr;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::IdentifierError;

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// 6-byte hardware address of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId([u8; 6]);

impl DeviceId {
    /// Create a new device id from 6 bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, taking the first 6 bytes and zero-padding short input
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut id = [0u8; 6];
        let len = bytes.len().min(6);
        id[..len].copy_from_slice(&bytes[..len]);
        Self(id)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for DeviceId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        let bytes = hex::decode(&clean)
            .map_err(|_| IdentifierError::invalid_device_id(s, "not a hex address"))?;

        if bytes.len() != 6 {
            return Err(IdentifierError::invalid_device_id(
                s,
                "address must be exactly 6 bytes",
            ));
        }

        Ok(Self::from_bytes(&bytes))
    }
}

impl Deref for DeviceId {
    type Target = [u8; 6];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Server Identifier
// ----------------------------------------------------------------------------

/// Identifier of a locally hosted server role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(u32);

impl ServerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Task Target
// ----------------------------------------------------------------------------

/// The entity a task operates on
///
/// Every task is bound to exactly one target. A task bound to the manager
/// concerns the radio itself (power, scanning, stack resets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    Manager,
    Device(DeviceId),
    Server(ServerId),
}

impl Target {
    /// The device this target refers to, if any
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Target::Device(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self, Target::Manager)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Manager => f.write_str("manager"),
            Target::Device(id) => write!(f, "device {}", id),
            Target::Server(id) => write!(f, "{}", id),
        }
    }
}

impl From<DeviceId> for Target {
    fn from(id: DeviceId) -> Self {
        Target::Device(id)
    }
}

impl From<ServerId> for Target {
    fn from(id: ServerId) -> Self {
        Target::Server(id)
    }
}

// ----------------------------------------------------------------------------
// Task Identifier
// ----------------------------------------------------------------------------

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an externally chosen value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Transaction Identifier
// ----------------------------------------------------------------------------

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Groups the tasks of one atomic transaction on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(other.as_millis() as u64))
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl Timestamp {
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Wall-clock milliseconds since the Unix epoch
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Duration since an earlier timestamp, zero if `other` is later
    pub fn duration_since(&self, other: Self) -> Duration {
        *self - other
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Source of monotonic timestamps
///
/// Trackers record when each flag was entered through this trait so tests
/// can drive time by hand.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock measuring from its own construction
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: instant::Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: instant::Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_millis() as u64)
    }
}

/// Hand-driven clock, shared between clones
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new([0xAA, 0xBB, 0x0C, 0x01, 0x02, 0xFF]);
        assert_eq!(id.to_string(), "AA:BB:0C:01:02:FF");
    }

    #[test]
    fn test_device_id_parse() {
        let colon: DeviceId = "aa:bb:0c:01:02:ff".parse().unwrap();
        let bare: DeviceId = "AABB0C0102FF".parse().unwrap();
        assert_eq!(colon, bare);
        assert_eq!(colon.as_bytes(), &[0xAA, 0xBB, 0x0C, 0x01, 0x02, 0xFF]);

        assert!("AA:BB:CC".parse::<DeviceId>().is_err());
        assert!("not-an-address".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_device_id_from_short_bytes() {
        let id = DeviceId::from_bytes(&[1, 2]);
        assert_eq!(id.as_bytes(), &[1, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_target_display() {
        let device = DeviceId::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(Target::Manager.to_string(), "manager");
        assert_eq!(Target::from(device).to_string(), "device 01:02:03:04:05:06");
        assert_eq!(Target::from(ServerId::new(3)).to_string(), "server#3");
        assert_eq!(Target::from(device).device(), Some(device));
    }

    #[test]
    fn test_manual_time_source() {
        let clock = ManualTimeSource::new();
        let shared = clock.clone();
        assert_eq!(clock.now(), Timestamp::new(0));

        shared.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Timestamp::new(250));
        assert_eq!(clock.now() - Timestamp::new(100), Duration::from_millis(150));
    }
}
