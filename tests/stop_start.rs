//! Orderly shutdown and restart.

use tvws_mac_rs::{
    mac::ExecMode,
    sap::{start::StartRequest, status::StatusRequest, stop::StopRequest, Status},
    test_helpers::{default_bs_parameters, spawn_engine, TunHarness},
    wire::messages::opcode,
};

#[test_log::test(tokio::test(start_paused = true))]
async fn stop_drains_to_standby_and_restarts() {
    let engine = spawn_engine(&default_bs_parameters(1, 0b1111));
    engine.start().await;

    // Traffic in flight while the operator stops the system.
    engine
        .tun
        .inject(TunHarness::ipv4_packet([10, 0, 0, 11], 100))
        .await;

    let (confirm, ()) = tokio::join!(engine.commander.request(StopRequest), async {
        // The engine announces the stop to the PHY and waits for the
        // response before tearing anything down.
        let request = engine.phy.next_control_from_mac().await;
        assert_eq!(request, [opcode::PHY_STOP]);
        engine.phy.control_to_mac(vec![opcode::PHY_STOP]).await;
    });
    assert_eq!(confirm.status, Status::Success);

    let status = engine.commander.request(StatusRequest).await;
    assert_eq!(status.mode, ExecMode::Standby);

    // A fresh start brings the system back up, reading the persisted
    // parameters.
    let confirm = engine.commander.request(StartRequest).await;
    assert_eq!(confirm.status, Status::Success);
    let request = engine.phy.next_control_from_mac().await;
    assert_eq!(request, [opcode::PHY_CONFIG]);
    engine.phy.control_to_mac(vec![opcode::PHY_CONFIG]).await;

    let status = engine.commander.request(StatusRequest).await;
    assert_eq!(status.mode, ExecMode::Idle);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn stop_in_standby_is_refused() {
    let engine = spawn_engine(&default_bs_parameters(1, 0b1111));

    let confirm = engine.commander.request(StopRequest).await;
    assert_eq!(confirm.status, Status::InvalidState);
}
