//! Engine spawning under a tokio test runtime.

use crate::{
    mac::{run_mac_engine, MacCommander, MacConfig},
    params::CurrentParameters,
    sap::{start::StartRequest, Status},
    wire::messages::opcode,
};

use super::{mem_tun, stub_phy, MemStore, PhyHarness, TunHarness};

/// Tokio-backed delay source for simulated subframe time.
#[derive(Clone, Copy)]
pub struct TokioDelay;

impl embedded_hal_async::delay::DelayNs for TokioDelay {
    async fn delay_ns(&mut self, ns: u32) {
        tokio::time::sleep(std::time::Duration::from_nanos(ns as u64)).await
    }

    async fn delay_us(&mut self, us: u32) {
        tokio::time::sleep(std::time::Duration::from_micros(us as u64)).await
    }

    async fn delay_ms(&mut self, ms: u32) {
        tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await
    }
}

/// A running engine and the far ends of all its seams.
pub struct Engine {
    pub commander: &'static MacCommander,
    pub phy: PhyHarness,
    pub tun: TunHarness,
    _task: tokio::task::JoinHandle<()>,
}

/// Spawn an engine whose factory parameters are `parameters`.
pub fn spawn_engine(parameters: &CurrentParameters) -> Engine {
    let commander: &'static MacCommander = Box::leak(Box::new(MacCommander::new()));
    let (phy, phy_harness) = stub_phy();
    let (tun, tun_harness) = mem_tun();
    let store = MemStore::with_default(parameters);

    let task = tokio::spawn(async move {
        run_mac_engine(
            phy,
            tun,
            commander,
            MacConfig {
                store,
                delay: TokioDelay,
            },
        )
        .await;
    });

    Engine {
        commander,
        phy: phy_harness,
        tun: tun_harness,
        _task: task,
    }
}

impl Engine {
    /// Drive the standby→config→start→idle bring-up: request a start and
    /// answer the PHYConfig.Request handshake.
    pub async fn start(&self) {
        let confirm = self.commander.request(StartRequest).await;
        assert_eq!(confirm.status, Status::Success);

        let request = self.phy.next_control_from_mac().await;
        assert_eq!(request, [opcode::PHY_CONFIG]);
        self.phy.control_to_mac(vec![opcode::PHY_CONFIG]).await;
    }
}
