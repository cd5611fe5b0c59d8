//! Flags describing the local radio

use super::flags::state_flags;

state_flags! {
    /// State of the local radio as seen by the manager
    pub enum ManagerState {
        Off = 0 => "OFF",
        TurningOn = 1 => "TURNING_ON",
        On = 2 => "ON",
        TurningOff = 3 => "TURNING_OFF",
        Scanning = 4 => "SCANNING",
        /// The stack is being reset after a crash
        Resetting = 5 => "RESETTING",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateFlag;

    #[test]
    fn test_bit_indices_are_distinct() {
        let mut seen = 0u64;
        for flag in ManagerState::ALL {
            assert_eq!(seen & flag.bit(), 0, "{} reuses a bit", flag);
            seen |= flag.bit();
        }
        assert_eq!(ManagerState::ALL.len(), 6);
    }
}
