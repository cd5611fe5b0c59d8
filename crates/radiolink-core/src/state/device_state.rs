//! Flags describing a remote peer

use super::flags::state_flags;
use super::StateMask;

state_flags! {
    /// State of a remote device
    pub enum DeviceState {
        Discovered = 0 => "DISCOVERED",
        Disconnected = 1 => "DISCONNECTED",
        Connecting = 2 => "CONNECTING",
        Connected = 3 => "CONNECTED",
        DiscoveringServices = 4 => "DISCOVERING_SERVICES",
        ServicesDiscovered = 5 => "SERVICES_DISCOVERED",
        /// Connected, services discovered and any post-connect setup done
        Initialized = 6 => "INITIALIZED",
        Unbonded = 7 => "UNBONDED",
        Bonding = 8 => "BONDING",
        Bonded = 9 => "BONDED",
        ReconnectingShortTerm = 10 => "RECONNECTING_SHORT_TERM",
        ReconnectingLongTerm = 11 => "RECONNECTING_LONG_TERM",
    }
}

impl DeviceState {
    /// Flags meaning a connection attempt is still in flight
    pub fn connecting_mask() -> StateMask<DeviceState> {
        StateMask::of(&[
            DeviceState::Connecting,
            DeviceState::ReconnectingShortTerm,
            DeviceState::ReconnectingLongTerm,
        ])
    }

    /// Initial vector for a device that was just discovered
    pub fn discovered_mask() -> StateMask<DeviceState> {
        StateMask::of(&[
            DeviceState::Discovered,
            DeviceState::Disconnected,
            DeviceState::Unbonded,
        ])
    }
}
