//! Reconfiguration: operator-driven and SNR-driven parameter changes.

use tvws_mac_rs::{
    mux::{Demultiplexer, Multiplexer},
    sap::{update::ParamUpdate, update::UpdateRequest, Status},
    test_helpers::{default_bs_parameters, spawn_engine, Engine},
    wire::{
        messages::opcode, Allocation, MacPdu, MacPduCtl, McsConfig, MimoConfig,
    },
    PeerId, TrafficClass,
};

/// Consume one scheduled subframe (start message, PDUs, end message).
async fn drain_subframe(engine: &Engine) -> Vec<MacPdu> {
    let tx_start = engine.phy.next_control_from_mac().await;
    assert_eq!(tx_start[0], opcode::BS_SUBFRAME_START);
    let pdus = engine.phy.next_pdus_from_mac().await;
    assert_eq!(
        engine.phy.next_control_from_mac().await,
        [opcode::SUBFRAME_END]
    );
    pdus
}

/// The parameter pushes contained in a set of PDUs, as (destination,
/// uplink MCS nibble) pairs.
fn parameter_pushes(pdus: &[MacPdu]) -> Vec<(PeerId, u8)> {
    let mut pushes = Vec::new();
    for pdu in pdus {
        let demux = Demultiplexer::parse(&pdu.mac_data).unwrap();
        for (class, sdu) in demux.sdus() {
            if class == TrafficClass::Control {
                pushes.push((demux.destination(), sdu[0] & 15));
            }
        }
    }
    pushes
}

#[test_log::test(tokio::test(start_paused = true))]
async fn operator_update_pushes_new_parameters_to_every_ue() {
    let engine = spawn_engine(&default_bs_parameters(2, 0b1111));
    engine.start().await;

    // Flush the initial pushes.
    engine.phy.trigger_tx().await;
    drain_subframe(&engine).await;

    let confirm = engine
        .commander
        .request(UpdateRequest {
            updates: vec![
                ParamUpdate::McsUplink(PeerId::from_nibble(1), 12),
                ParamUpdate::McsUplink(PeerId::from_nibble(2), 12),
            ],
        })
        .await;
    assert_eq!(confirm.status, Status::Success);

    // The reconfiguration happens between events; the next transmit
    // opportunity carries exactly one refreshed push per UE.
    engine.phy.trigger_tx().await;
    let pdus = drain_subframe(&engine).await;

    let pushes = parameter_pushes(&pdus);
    assert_eq!(
        pushes,
        vec![
            (PeerId::from_nibble(1), 12),
            (PeerId::from_nibble(2), 12),
        ]
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn unknown_peer_update_is_refused() {
    let engine = spawn_engine(&default_bs_parameters(1, 0b1111));
    engine.start().await;

    let confirm = engine
        .commander
        .request(UpdateRequest {
            updates: vec![ParamUpdate::Tpc(PeerId::from_nibble(9), 3)],
        })
        .await;
    assert_eq!(confirm.status, Status::UnknownPeer);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn received_snr_adapts_the_uplink_mcs() {
    let engine = spawn_engine(&default_bs_parameters(1, 0b1111));
    engine.start().await;

    // Flush the initial push.
    engine.phy.trigger_tx().await;
    drain_subframe(&engine).await;

    // An uplink PDU whose average SNR maps to MCS 10 instead of the
    // configured 9.
    let ue = PeerId::from_nibble(1);
    let mut mux = Multiplexer::new(1000, ue, PeerId::BASE_STATION);
    mux.add_sdu(vec![b'2'], TrafficClass::Control).unwrap();
    let mut pdu = MacPdu::new(
        0,
        MacPduCtl::default(),
        Allocation {
            target_peer: ue,
            first_rb: 0,
            number_of_rb: 33,
        },
        MimoConfig::default(),
        McsConfig::default(),
    );
    mux.build_pdu(&mut pdu.mac_data);
    pdu.snr_avg = 12.0;

    engine
        .phy
        .control_to_mac(vec![opcode::BS_SUBFRAME_START])
        .await;
    engine.phy.pdus_to_mac(vec![pdu]).await;
    engine.phy.control_to_mac(vec![opcode::SUBFRAME_END]).await;
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;

    // The adaptation entered reconfiguration and queued a refreshed push.
    engine.phy.trigger_tx().await;
    let pdus = drain_subframe(&engine).await;
    assert_eq!(parameter_pushes(&pdus), vec![(ue, 10)]);
}
