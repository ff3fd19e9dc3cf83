//! Operator-driven parameter updates.
//!
//! Each request stages a set of changes into the dynamic parameters and
//! asks for a reconfiguration. The engine applies the staging once its
//! transmit and receive paths are quiescent, pushes refreshed parameter
//! SDUs to every UE and persists the new snapshot.

use alloc::vec::Vec;

use super::Status;
use crate::{
    wire::{Allocation, MimoConfig},
    PeerId,
};

/// One staged parameter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUpdate {
    FusionLut(u8),
    RxMetricPeriodicity(u8),
    UlReservation(Allocation),
    McsDownlink(PeerId, u8),
    McsUplink(PeerId, u8),
    Mimo(PeerId, MimoConfig),
    Tpc(PeerId, u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateRequest {
    pub updates: Vec<ParamUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateConfirm {
    pub status: Status,
}
