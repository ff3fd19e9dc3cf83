//! In-memory collaborators for driving the engine in tests.
//!
//! [`StubPhy`] stands in for the L1 transceiver: the same four channels,
//! with the far ends held by a [`PhyHarness`] the test scripts against.
//! [`MemTun`] and [`MemStore`] play the tunnel device and the parameter
//! files. Everything runs under a paused tokio clock, so subframe time is
//! simulated and tests are deterministic.

mod phy_stub;
mod run;
mod store;
mod tun_stub;

pub use phy_stub::{stub_phy, PhyHarness, StubPhy};
pub use run::{spawn_engine, Engine, TokioDelay};
pub use store::{default_bs_parameters, default_ue_parameters, MemStore};
pub use tun_stub::{mem_tun, MemTun, TunHarness};
