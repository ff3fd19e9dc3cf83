//! Bring the MAC out of standby.
//!
//! The request triggers the configuration sequence: persisted parameters
//! are loaded, all subsystems are allocated, the peer table is filled and
//! the PHY is asked to configure itself. The confirm is returned once the
//! engine has configured itself and is bringing up the PHY.

use super::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartConfirm {
    pub status: Status,
}
