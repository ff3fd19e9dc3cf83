//! Orderly shutdown.
//!
//! The engine sends PHYStop.Request, waits for the response, then waits
//! for every worker to reach quiescence before tearing the stack down.
//! The confirm arrives once the MAC is back in standby; no SDU that was
//! already accepted is dequeued after that point.

use super::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopConfirm {
    pub status: Status,
}
