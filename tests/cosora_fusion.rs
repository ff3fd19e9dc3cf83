//! Spectrum-sensing fusion across several UE reports.

use tvws_mac_rs::{
    mux::Multiplexer,
    test_helpers::{default_bs_parameters, spawn_engine},
    wire::{
        messages::{self, opcode},
        Allocation, MacPdu, MacPduCtl, McsConfig, MimoConfig, RxMetrics, SnrPerRb,
    },
    PeerId, TrafficClass,
};

#[test_log::test(tokio::test(start_paused = true))]
async fn fused_reports_publish_a_new_lut() {
    // Fusion window of 10 subframes, all channels initially idle.
    let engine = spawn_engine(&default_bs_parameters(1, 0b1111));
    engine.start().await;

    // Three spectrum sensing reports inside one window. The SNR values
    // are chosen to keep the MCS adaptation quiet.
    let ue = PeerId::from_nibble(1);
    let mut mux = Multiplexer::new(10_000, ue, PeerId::BASE_STATION);
    for ss_report in [0b1110u8, 0b1111, 0b1011] {
        let report = RxMetrics {
            snr: SnrPerRb::from_slice(&[11.0; 4]).unwrap(),
            snr_avg: 11.0,
            rank_indicator: 1,
            ss_report,
        };
        mux.add_sdu(messages::rx_metrics_sdu(&report), TrafficClass::Control)
            .unwrap();
    }

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
    pdu.snr_avg = 11.0;

    engine
        .phy
        .control_to_mac(vec![opcode::BS_SUBFRAME_START])
        .await;
    engine.phy.pdus_to_mac(vec![pdu]).await;
    engine.phy.control_to_mac(vec![opcode::SUBFRAME_END]).await;

    // Let the window expire: 1110 & 1111 & 1011 = 1010. The changed LUT
    // triggers a reconfiguration, which informs the PHY.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let message = engine.phy.next_control_from_mac().await;
    assert_eq!(message, [opcode::TX_INDICATION, 0b1010]);
}
