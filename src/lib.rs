#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![allow(async_fn_in_trait)]

extern crate alloc;
extern crate core;

// This must go FIRST so that all the other modules see its macros.
mod fmt;

pub mod amc;
pub mod buffers;
pub mod consts;
pub mod cosora;
pub mod crc;
pub mod mac;
pub mod mux;
pub mod params;
pub mod phy;
mod reqresp;
pub mod resolver;
pub mod sap;
pub mod scheduler;
pub mod serdes;
#[cfg(feature = "test_helpers")]
pub mod test_helpers;
pub mod time;
pub mod tun;
pub mod wire;

/// A 4-bit terminal identifier.
///
/// `0` is always the base station. `1..=14` are user equipments.
/// `15` is reserved for broadcast and is never a unicast destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PeerId(u8);

impl PeerId {
    pub const BASE_STATION: Self = Self(0);
    pub const BROADCAST: Self = Self(15);

    /// Create a peer id from the low nibble of `value`.
    pub const fn from_nibble(value: u8) -> Self {
        Self(value & 0x0F)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn is_base_station(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for PeerId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < 16 {
            Ok(Self(value))
        } else {
            Err(value)
        }
    }
}

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role this MAC instance plays in the network.
///
/// At most one role is active in a process at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MacRole {
    BaseStation,
    #[default]
    UserEquipment,
}

impl MacRole {
    pub const fn is_base_station(self) -> bool {
        matches!(self, MacRole::BaseStation)
    }
}

/// Class of traffic an SDU belongs to.
///
/// Control SDUs (MACC) always precede data SDUs (MACD) inside a PDU and
/// never expire from the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TrafficClass {
    Control,
    Data,
}

impl TrafficClass {
    /// The flag bit used in the PDU header: 1 = data, 0 = control.
    pub const fn flag_bit(self) -> u8 {
        match self {
            TrafficClass::Control => 0,
            TrafficClass::Data => 1,
        }
    }

    pub const fn from_flag_bit(bit: u8) -> Self {
        if bit & 1 == 1 {
            TrafficClass::Data
        } else {
            TrafficClass::Control
        }
    }
}
