//! Observability into the running engine.

use crate::{buffers::DropCounters, mac::ExecMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusConfirm {
    pub mode: ExecMode,
    /// Current subframe number; 0 while in standby.
    pub subframe: u64,
    pub counters: DropCounters,
}
