//! Named state flags and the bit-vector value built from them

use core::fmt;
use core::hash::Hash;
use core::marker::PhantomData;
use core::ops::BitOr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ----------------------------------------------------------------------------
// State Flag
// ----------------------------------------------------------------------------

/// One boolean fact about an entity, mapped to a fixed bit index
///
/// Flags are not mutually exclusive: a device can be CONNECTED and BONDED
/// at the same time.
pub trait StateFlag: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every flag, in bit order
    const ALL: &'static [Self];

    fn bit_index(self) -> u32;

    fn bit(self) -> u64 {
        1u64 << self.bit_index()
    }

    fn name(self) -> &'static str;
}

/// Declares a flag enum together with its `StateFlag` mapping
macro_rules! state_flags {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $index:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $crate::state::StateFlag for $name {
            const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            fn bit_index(self) -> u32 {
                match self {
                    $( Self::$variant => $index, )+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str($crate::state::StateFlag::name(*self))
            }
        }
    };
}

pub(crate) use state_flags;

// ----------------------------------------------------------------------------
// State Mask
// ----------------------------------------------------------------------------

/// Whole bit-vector of flags of type `S`
///
/// A mask is a value: every change produces a new mask, which the tracker
/// diffs against the stored one.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateMask<S> {
    bits: u64,
    _flags: PhantomData<fn() -> S>,
}

impl<S: StateFlag> StateMask<S> {
    pub const fn empty() -> Self {
        Self::from_bits(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _flags: PhantomData,
        }
    }

    /// Mask with every known flag set
    pub fn full() -> Self {
        S::ALL.iter().copied().collect()
    }

    pub fn of(flags: &[S]) -> Self {
        flags.iter().copied().collect()
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn with(self, flag: S) -> Self {
        Self::from_bits(self.bits | flag.bit())
    }

    pub fn without(self, flag: S) -> Self {
        Self::from_bits(self.bits & !flag.bit())
    }

    pub fn set(self, flag: S, value: bool) -> Self {
        if value {
            self.with(flag)
        } else {
            self.without(flag)
        }
    }

    pub fn contains(&self, flag: S) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn contains_any(&self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    pub fn contains_all(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub fn union(self, other: Self) -> Self {
        Self::from_bits(self.bits | other.bits)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self::from_bits(self.bits & other.bits)
    }

    pub fn difference(self, other: Self) -> Self {
        Self::from_bits(self.bits & !other.bits)
    }

    /// Bits that differ between the two masks
    pub fn changed(self, other: Self) -> Self {
        Self::from_bits(self.bits ^ other.bits)
    }

    /// Set flags in bit order; bits with no named flag are skipped
    pub fn iter(&self) -> impl Iterator<Item = S> + '_ {
        S::ALL.iter().copied().filter(move |flag| self.contains(*flag))
    }
}

impl<S: StateFlag> Default for StateMask<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: StateFlag> From<S> for StateMask<S> {
    fn from(flag: S) -> Self {
        Self::from_bits(flag.bit())
    }
}

impl<S: StateFlag> FromIterator<S> for StateMask<S> {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_bits(iter.into_iter().fold(0, |bits, flag| bits | flag.bit()))
    }
}

impl<S: StateFlag> BitOr for StateMask<S> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl<S: StateFlag> BitOr<S> for StateMask<S> {
    type Output = Self;

    fn bitor(self, rhs: S) -> Self {
        self.with(rhs)
    }
}

impl<S: StateFlag> fmt::Display for StateMask<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        let mut first = true;
        for flag in self.iter() {
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(flag.name())?;
            first = false;
        }
        Ok(())
    }
}

impl<S: StateFlag> fmt::Debug for StateMask<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateMask({:#x}: {})", self.bits, self)
    }
}

impl<S> Serialize for StateMask<S> {
    fn serialize<Se: Serializer>(&self, serializer: Se) -> Result<Se::Ok, Se::Error> {
        serializer.serialize_u64(self.bits)
    }
}

impl<'de, S> Deserialize<'de> for StateMask<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        Ok(Self {
            bits,
            _flags: PhantomData,
        })
    }
}

// ----------------------------------------------------------------------------
// Intent
// ----------------------------------------------------------------------------

/// Whether a change was caused by a locally initiated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Intentional,
    Unintentional,
}

impl Intent {
    /// Intent mask covering every bit, or none
    pub fn mask<S: StateFlag>(self) -> StateMask<S> {
        match self {
            Intent::Intentional => StateMask::from_bits(u64::MAX),
            Intent::Unintentional => StateMask::empty(),
        }
    }
}

impl From<bool> for Intent {
    fn from(intentional: bool) -> Self {
        if intentional {
            Intent::Intentional
        } else {
            Intent::Unintentional
        }
    }
}

impl<S: StateFlag> From<Intent> for StateMask<S> {
    fn from(intent: Intent) -> Self {
        intent.mask()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeviceState;

    #[test]
    fn test_mask_building() {
        let mask = StateMask::of(&[DeviceState::Connected, DeviceState::Bonded]);
        assert!(mask.contains(DeviceState::Connected));
        assert!(mask.contains(DeviceState::Bonded));
        assert!(!mask.contains(DeviceState::Connecting));

        let without = mask.without(DeviceState::Bonded);
        assert_eq!(without, StateMask::from(DeviceState::Connected));
        assert_eq!(mask | DeviceState::Bonding, mask.with(DeviceState::Bonding));
    }

    #[test]
    fn test_mask_any_all() {
        let mask = StateMask::of(&[DeviceState::Connected, DeviceState::Initialized]);
        let query = StateMask::of(&[DeviceState::Connected, DeviceState::Bonded]);
        assert!(mask.contains_any(query));
        assert!(!mask.contains_all(query));
        assert!(mask.contains_all(StateMask::from(DeviceState::Initialized)));
        assert!(mask.contains_all(StateMask::empty()));
    }

    #[test]
    fn test_mask_display() {
        let mask = StateMask::of(&[DeviceState::Bonded, DeviceState::Connected]);
        assert_eq!(mask.to_string(), "CONNECTED | BONDED");
        assert_eq!(StateMask::<DeviceState>::empty().to_string(), "(none)");
    }

    #[test]
    fn test_mask_serializes_as_bits() {
        let mask = StateMask::of(&[DeviceState::Connected]);
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, DeviceState::Connected.bit().to_string());

        let back: StateMask<DeviceState> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn test_intent_masks() {
        assert!(Intent::Intentional
            .mask::<DeviceState>()
            .contains(DeviceState::Connected));
        assert!(Intent::Unintentional.mask::<DeviceState>().is_empty());
        assert_eq!(Intent::from(true), Intent::Intentional);
    }
}
