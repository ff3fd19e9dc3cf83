//! Protocol control: decoding of received subframes and MACC SDUs, and
//! production of reception-metric reports.

use super::state::MacState;
use crate::{
    amc,
    mux::Demultiplexer,
    phy::{self, Phy},
    serdes::Serdes,
    tun::TunDevice,
    wire::{
        messages::{self, BsSubframeRxStart, UeSubframeRxStart},
        MacPdu, RxMetrics,
    },
    PeerId, TrafficClass,
};

/// Handle BSSubframeRx.Start: pull the waiting PDUs off the L1 channel and
/// decode them. The receive path stays marked active until Subframe.End.
pub(crate) async fn receive_subframe_bs<P: Phy, T: TunDevice>(
    state: &mut MacState,
    phy: &mut P,
    tun: &mut T,
    _metrics: Option<BsSubframeRxStart>,
) -> Result<(), P::Error> {
    state.sub_modes.set_rx(true);

    let pdus = phy::receive_pdus(phy, &mut state.buffers.counters).await?;
    trace!("Receiving {} PDUs from L1", pdus.len());
    for pdu in pdus {
        decode_pdu_bs(state, tun, pdu).await;
    }

    Ok(())
}

/// Handle UESubframeRx.Start: fold in the metrics the PHY measured, then
/// decode the waiting PDUs.
pub(crate) async fn receive_subframe_ue<P: Phy, T: TunDevice>(
    state: &mut MacState,
    phy: &mut P,
    tun: &mut T,
    parameters: Option<UeSubframeRxStart>,
) -> Result<(), P::Error> {
    state.sub_modes.set_rx(true);

    if let Some(parameters) = parameters {
        let ss_report = parameters.ssm & 0b1111;
        let outdated = state
            .rx_metrics_mut(PeerId::BASE_STATION)
            .map(|metrics| {
                let changed = metrics.snr != parameters.snr || metrics.ss_report != ss_report;
                if changed {
                    metrics.snr = parameters.snr;
                    metrics.ss_report = ss_report;
                }
                changed
            })
            .unwrap_or(false);

        if outdated {
            enqueue_metric_report(state);
        }
    }

    let pdus = phy::receive_pdus(phy, &mut state.buffers.counters).await?;
    trace!("Receiving {} PDUs from L1", pdus.len());
    for pdu in pdus {
        decode_pdu_ue(state, tun, pdu).await;
    }

    Ok(())
}

/// Base-station decode of one uplink PDU: link adaptation from the PDU's
/// average SNR, then SDU demultiplexing.
async fn decode_pdu_bs<T: TunDevice>(state: &mut MacState, tun: &mut T, pdu: MacPdu) {
    let demux = match Demultiplexer::parse(&pdu.mac_data) {
        Ok(demux) => demux,
        Err(e) => {
            warn!("Dropping undecodable PDU: {:?}", e);
            return;
        }
    };
    let source = demux.source();
    debug!("Decoding PDU from peer {}", source);

    // Every received PDU re-evaluates the uplink MCS for its sender.
    let adapted = amc::snr_to_mcs(pdu.snr_avg);
    if let Some(link) = state.staged.link_mut(source) {
        link.mcs_uplink = adapted;
    }
    let applied = state
        .current
        .dynamic
        .link(source)
        .map(|link| link.mcs_uplink);
    if state.staged.link(source).map(|link| link.mcs_uplink) != applied {
        debug!("Uplink MCS for peer {} adapts to {}", source, adapted);
        state.system_reconfig = true;
        state.current.ues_outdated = true;
    }

    for (class, sdu) in demux.sdus() {
        match class {
            TrafficClass::Data => {
                trace!("Data SDU received, forwarding to L3");
                if let Err(e) = tun.send(sdu).await {
                    warn!("Could not forward SDU to L3: {:?}", e);
                }
            }
            TrafficClass::Control => decode_control_sdu_bs(state, source, sdu),
        }
    }
}

/// Base-station decode of one MACC SDU.
fn decode_control_sdu_bs(state: &mut MacState, source: PeerId, sdu: &[u8]) {
    match sdu.first() {
        Some(&messages::MACC_ACK) => {
            debug!("Received ACK from UE {}", source);
        }
        Some(&messages::MACC_RX_METRICS) => {
            let mut bytes = sdu[1..].to_vec();
            let metrics = match RxMetrics::take(&mut bytes) {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!("Undecodable metric report from peer {}: {:?}", source, e);
                    return;
                }
            };

            // The reported downlink SNR drives the downlink MCS.
            let adapted = amc::snr_to_mcs(metrics.snr_avg);
            if let Some(link) = state.staged.link_mut(source) {
                link.mcs_downlink = adapted;
            }
            let applied = state
                .current
                .dynamic
                .link(source)
                .map(|link| link.mcs_downlink);
            if state.staged.link(source).map(|link| link.mcs_downlink) != applied {
                debug!("Downlink MCS for peer {} adapts to {}", source, adapted);
                state.system_reconfig = true;
            }

            // The spectrum sensing report feeds the fusion.
            let now = state.clock.now();
            state.cosora.fuse(metrics.ss_report, now);

            if let Some(slot) = state.rx_metrics_mut(source) {
                *slot = metrics;
            }
        }
        _ => warn!("Unknown control SDU from peer {}", source),
    }
}

/// User-equipment decode of one downlink PDU: keep the quality snapshot
/// fresh, forward data to L3 and apply parameter pushes.
async fn decode_pdu_ue<T: TunDevice>(state: &mut MacState, tun: &mut T, pdu: MacPdu) {
    if let Some(metrics) = state.rx_metrics_mut(PeerId::BASE_STATION) {
        metrics.snr_avg = pdu.snr_avg;
        metrics.rank_indicator = pdu.rank_indicator;
    }

    let demux = match Demultiplexer::parse(&pdu.mac_data) {
        Ok(demux) => demux,
        Err(e) => {
            warn!("Dropping undecodable PDU: {:?}", e);
            return;
        }
    };

    for (class, sdu) in demux.sdus() {
        match class {
            TrafficClass::Data => {
                trace!("Data SDU received, forwarding to L3");
                if let Err(e) = tun.send(sdu).await {
                    warn!("Could not forward SDU to L3: {:?}", e);
                }
            }
            TrafficClass::Control => match state.staged.apply_peer_push(sdu) {
                Ok(()) => {
                    info!("Reconfiguring from a parameter push");
                    state.system_reconfig = true;

                    let now = state.clock.now();
                    state
                        .buffers
                        .enqueue_control(messages::ack_sdu(), PeerId::BASE_STATION, now);
                }
                Err(e) => warn!("Undecodable parameter push: {:?}", e),
            },
        }
    }

    // Reports also go out on the configured cadence, tracking the moving
    // average the PHY sees.
    let period = state.current.dynamic.rx_metric_periodicity as u64;
    if period > 0 && state.clock.now().saturating_sub(state.last_report_at) >= period {
        enqueue_metric_report(state);
    }
}

/// Queue a reception-metric report MACC SDU towards the base station.
pub(crate) fn enqueue_metric_report(state: &mut MacState) {
    let Some(metrics) = state.rx_metrics_mut(PeerId::BASE_STATION).map(|m| m.clone()) else {
        return;
    };

    let sdu = messages::rx_metrics_sdu(&metrics);
    debug!("Metric report of {} bytes queued to BS", sdu.len());

    let now = state.clock.now();
    state
        .buffers
        .enqueue_control(sdu, PeerId::BASE_STATION, now);
    state.last_report_at = now;
}
