//! Execution modes and the live component stack.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::{
    buffers::SduBuffers,
    cosora::Cosora,
    params::{CurrentParameters, DynamicParameters},
    resolver::IpPeerTable,
    time::SubframeClock,
    wire::RxMetrics,
    PeerId,
};

/// The lifecycle state machine of the MAC.
///
/// Standby is the only state in which no subsystem exists. Config, Start,
/// Reconfig and Stop are transitional; Idle is where the system spends its
/// life moving traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ExecMode {
    #[default]
    Standby,
    Config,
    Start,
    Idle,
    Reconfig,
    Stop,
}

impl ExecMode {
    /// The legal transitions of the lifecycle.
    pub fn can_transition_to(self, next: ExecMode) -> bool {
        use ExecMode::*;
        matches!(
            (self, next),
            (Standby, Config)
                | (Config, Start)
                | (Start, Idle)
                | (Start, Stop)
                | (Idle, Reconfig)
                | (Reconfig, Idle)
                | (Idle, Stop)
                | (Stop, Standby)
        )
    }
}

/// Per-worker activity flags.
///
/// Each worker path marks itself active while it handles an event and
/// disabled when it is done; the controller only takes destructive
/// transitions (Reconfig, Stop) once the relevant paths are disabled.
/// Cooperative cancellation: nothing is ever torn down mid-operation.
#[derive(Debug, Default)]
pub struct SubModes {
    rx: AtomicBool,
    tx: AtomicBool,
    tun: AtomicBool,
}

impl SubModes {
    pub const fn new() -> Self {
        Self {
            rx: AtomicBool::new(false),
            tx: AtomicBool::new(false),
            tun: AtomicBool::new(false),
        }
    }

    pub fn set_rx(&self, active: bool) {
        self.rx.store(active, Ordering::Release);
    }

    pub fn set_tx(&self, active: bool) {
        self.tx.store(active, Ordering::Release);
    }

    pub fn set_tun(&self, active: bool) {
        self.tun.store(active, Ordering::Release);
    }

    pub fn rx_active(&self) -> bool {
        self.rx.load(Ordering::Acquire)
    }

    pub fn tx_active(&self) -> bool {
        self.tx.load(Ordering::Acquire)
    }

    pub fn tun_active(&self) -> bool {
        self.tun.load(Ordering::Acquire)
    }

    /// True when no worker path is mid-operation.
    pub fn all_quiescent(&self) -> bool {
        !self.rx_active() && !self.tx_active() && !self.tun_active()
    }
}

/// Everything that exists between Config and Stop.
pub(crate) struct MacState {
    pub current: CurrentParameters,
    /// The staging side of the parameter store: the CLI, link adaptation
    /// and Cosora write here; Reconfig copies it into `current`.
    pub staged: DynamicParameters,
    pub resolver: IpPeerTable,
    pub buffers: SduBuffers,
    pub cosora: Cosora,
    pub clock: SubframeClock,
    pub sub_modes: SubModes,
    pub mode: ExecMode,
    rx_metrics: Vec<(PeerId, RxMetrics)>,
    /// The operator asked for a reconfiguration.
    pub cli_reconfig: bool,
    /// Link adaptation or Cosora staged a change.
    pub system_reconfig: bool,
    /// Subframe of the last reception-metric report (UE only).
    pub last_report_at: u64,
}

impl MacState {
    /// Build the full component stack from an applied parameter snapshot.
    /// At the base station this also queues one parameter-push MACC SDU
    /// per UE so every peer learns its initial settings.
    pub fn configure(current: CurrentParameters) -> Self {
        let buffer_peers = current.buffer_peers();

        let mut state = Self {
            staged: current.dynamic.clone(),
            resolver: IpPeerTable::with_defaults(current.num_ues()),
            buffers: SduBuffers::new(buffer_peers.iter().copied()),
            cosora: Cosora::new(current.ss_report_wait_timeout),
            clock: SubframeClock::new(),
            sub_modes: SubModes::new(),
            mode: ExecMode::Config,
            rx_metrics: buffer_peers
                .iter()
                .map(|&peer| (peer, RxMetrics::default()))
                .collect(),
            cli_reconfig: false,
            system_reconfig: false,
            last_report_at: 0,
            current,
        };

        if state.current.role.is_base_station() {
            state.enqueue_parameter_push();
        }

        state
    }

    pub fn set_mode(&mut self, next: ExecMode) {
        debug_assert!(self.mode.can_transition_to(next), "illegal mode transition");
        self.mode = next;
    }

    pub fn rx_metrics_mut(&mut self, peer: PeerId) -> Option<&mut RxMetrics> {
        self.rx_metrics
            .iter_mut()
            .find(|(id, _)| *id == peer)
            .map(|(_, metrics)| metrics)
    }

    /// Queue one MACC SDU per served UE carrying its current parameters.
    /// Only meaningful at the base station.
    pub fn enqueue_parameter_push(&mut self) {
        let now = self.clock.now();
        let peers: Vec<PeerId> = self.current.dynamic.peer_ids().collect();

        for peer in peers {
            if let Some(sdu) = self.current.dynamic.serialize_for_peer(peer) {
                debug!("Queueing parameter push for UE {}", peer);
                self.buffers.enqueue_control(sdu, peer, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use ExecMode::*;

        assert!(Standby.can_transition_to(Config));
        assert!(Config.can_transition_to(Start));
        assert!(Start.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Reconfig));
        assert!(Reconfig.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Stop));
        assert!(Stop.can_transition_to(Standby));

        assert!(!Standby.can_transition_to(Idle));
        assert!(!Reconfig.can_transition_to(Stop));
        assert!(!Stop.can_transition_to(Idle));
    }

    #[test]
    fn sub_modes_gate_quiescence() {
        let sub_modes = SubModes::new();
        assert!(sub_modes.all_quiescent());

        sub_modes.set_rx(true);
        assert!(!sub_modes.all_quiescent());
        sub_modes.set_tun(true);
        sub_modes.set_rx(false);
        assert!(!sub_modes.all_quiescent());
        sub_modes.set_tun(false);
        assert!(sub_modes.all_quiescent());
    }
}
