//! The operator-facing service access point.
//!
//! The CLI (or any other operator surface) talks to the engine through
//! typed request/confirm primitives carried by the
//! [`MacCommander`](crate::mac::MacCommander).

use start::{StartConfirm, StartRequest};
use status::{StatusConfirm, StatusRequest};
use stop::{StopConfirm, StopRequest};
use update::{UpdateConfirm, UpdateRequest};

pub mod start;
pub mod status;
pub mod stop;
pub mod update;

/// Outcome of a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Status {
    #[default]
    Success,
    /// The request does not apply to the current execution mode.
    InvalidState,
    /// The persisted parameter image could not be parsed.
    ConfigInvalid,
    /// The request addressed a peer the MAC does not serve.
    UnknownPeer,
    /// The PHY did not answer within the guard interval.
    PhyNotReady,
}

#[allow(private_bounds)]
pub trait Request: From<RequestValue> + Into<RequestValue> {
    type Confirm: From<ConfirmValue> + Into<ConfirmValue>;
}

pub(crate) enum RequestValue {
    Start(StartRequest),
    Stop(StopRequest),
    Update(UpdateRequest),
    Status(StatusRequest),
}

pub(crate) enum ConfirmValue {
    Start(StartConfirm),
    Stop(StopConfirm),
    Update(UpdateConfirm),
    Status(StatusConfirm),
}

macro_rules! impl_request {
    ($request:ty, $confirm:ty, $variant:ident) => {
        impl Request for $request {
            type Confirm = $confirm;
        }

        impl From<$request> for RequestValue {
            fn from(v: $request) -> Self {
                Self::$variant(v)
            }
        }

        impl From<RequestValue> for $request {
            fn from(v: RequestValue) -> Self {
                match v {
                    RequestValue::$variant(inner) => inner,
                    _ => panic!("Request has a different concrete type"),
                }
            }
        }

        impl From<$confirm> for ConfirmValue {
            fn from(v: $confirm) -> Self {
                Self::$variant(v)
            }
        }

        impl From<ConfirmValue> for $confirm {
            fn from(v: ConfirmValue) -> Self {
                match v {
                    ConfirmValue::$variant(inner) => inner,
                    _ => panic!("Confirm has a different concrete type"),
                }
            }
        }
    };
}

impl_request!(StartRequest, StartConfirm, Start);
impl_request!(StopRequest, StopConfirm, Stop);
impl_request!(UpdateRequest, UpdateConfirm, Update);
impl_request!(StatusRequest, StatusConfirm, Status);
