//! SDU scheduling: spectrum partitioning, capacity math and PDU filling.
//!
//! The base station picks up to two peers with pending traffic, splits the
//! idle spectrum between them according to the fusion LUT, and fills one
//! MAC PDU per peer up to the bit capacity of its allocation. A user
//! equipment fills a single PDU for the uplink reservation it was assigned.

use alloc::{vec, vec::Vec};

use crate::{
    amc::modulation_for_mcs,
    buffers::SduBuffers,
    consts::{DCI_SIZE, NUMEROLOGY, NUM_TB_PER_DCI},
    mux::Multiplexer,
    params::CurrentParameters,
    wire::{Allocation, MacPdu, MacPduCtl, McsConfig, MimoConfig, MimoScheme, Modulation},
    PeerId, TrafficClass,
};

/// Resource elements available in one allocation, after the pilot and DCI
/// discounts.
pub fn re_capacity(numerology_id: u8, allocation: &Allocation, mimo: &MimoConfig) -> usize {
    let table = &NUMEROLOGY[numerology_id as usize];
    let num_rb = allocation.number_of_rb.max(1) as usize;

    let per_rb = (table.subcarriers_per_rb * table.m * table.symbols_per_subframe) as usize;
    let per_rb = per_rb - per_rb / (table.pilot_df * table.pilot_dt) as usize;

    let extra_dcis = (num_rb - 1) / NUM_TB_PER_DCI as usize;
    let mut total = (per_rb * num_rb)
        .saturating_sub(DCI_SIZE as usize)
        .saturating_sub(DCI_SIZE as usize * extra_dcis);

    if mimo.scheme == MimoScheme::Multiplexing {
        total *= mimo.num_tx_antennas as usize;
    }
    total
}

/// Gross bits one allocation can carry with the given modulation.
pub fn bit_capacity(
    numerology_id: u8,
    allocation: &Allocation,
    mimo: &MimoConfig,
    modulation: Modulation,
) -> usize {
    re_capacity(numerology_id, allocation, mimo) * modulation.bits_per_symbol() as usize
}

/// The number of resource blocks needed to move `info_bits` at the target
/// code rate: the inverse of the capacity formula.
pub fn required_rbs(
    numerology_id: u8,
    mimo: &MimoConfig,
    modulation: Modulation,
    target_coderate: f32,
    info_bits: usize,
) -> usize {
    use micromath::F32Ext;

    let q = modulation.bits_per_symbol() as usize;
    let one_rb = Allocation {
        target_peer: PeerId::BASE_STATION,
        first_rb: 0,
        number_of_rb: 1,
    };

    let gross_rb_bits =
        bit_capacity(numerology_id, &one_rb, mimo, modulation) + DCI_SIZE as usize * q;
    let gross_rb_qam = gross_rb_bits / q;

    let required_bits = (info_bits as f32 / target_coderate).round();
    let mut required_qam = (required_bits / q as f32).round() as usize;
    required_qam += DCI_SIZE as usize;
    required_qam += ((required_qam - DCI_SIZE as usize) / gross_rb_qam) / NUM_TB_PER_DCI as usize
        * DCI_SIZE as usize;

    (required_qam as f32 / gross_rb_qam as f32).ceil() as usize
}

/// Split the idle spectrum indicated by the fusion LUT between two
/// recipients: `(first_rb, number_of_rb)` for each.
///
/// The table is exhaustive over the reachable LUT values; `None` means no
/// TV channel is idle and nothing may be transmitted.
pub fn partition_spectrum(fusion_lut: u8) -> Option<[(u8, u8); 2]> {
    let spans = match fusion_lut & 0b1111 {
        15 => [(0, 66), (66, 66)],
        13 => [(0, 66), (99, 33)],
        11 => [(0, 33), (66, 66)],
        14 => [(0, 49), (49, 50)],
        7 => [(33, 49), (82, 50)],
        12 => [(0, 33), (33, 33)],
        10 => [(0, 33), (66, 33)],
        9 => [(0, 33), (99, 33)],
        6 => [(33, 33), (66, 33)],
        5 => [(33, 33), (99, 33)],
        3 => [(66, 33), (99, 33)],
        8 => [(0, 16), (16, 17)],
        4 => [(33, 16), (49, 17)],
        2 => [(66, 16), (82, 17)],
        1 => [(99, 16), (115, 17)],
        _ => return None,
    };
    Some(spans)
}

/// Move SDUs for `peer` into the multiplexer, control SDUs first, until
/// the next SDU no longer fits the byte budget.
fn aggregate(mux: &mut Multiplexer, buffers: &mut SduBuffers, peer: PeerId) {
    for class in [TrafficClass::Control, TrafficClass::Data] {
        loop {
            let next_size = match class {
                TrafficClass::Control => buffers.next_control_size(peer),
                TrafficClass::Data => buffers.next_data_size(peer),
            };
            let Some(size) = next_size else { break };

            if !mux.fits(size) || mux.num_sdus() == u8::MAX as usize {
                trace!("Stopping aggregation for peer {}: budget reached", peer);
                break;
            }

            let sdu = unwrap!(match class {
                TrafficClass::Control => buffers.next_control(peer),
                TrafficClass::Data => buffers.next_data(peer),
            });

            if let Err(e) = mux.add_sdu(sdu, class) {
                warn!("Dropping SDU for peer {}: {:?}", peer, e);
            }
        }
    }
}

fn fill_pdu(
    current: &CurrentParameters,
    buffers: &mut SduBuffers,
    allocation: Allocation,
    source: PeerId,
    buffer_peer: PeerId,
    subframe: u32,
) -> Option<MacPdu> {
    // MIMO and MCS follow the link settings of the addressed peer; on the
    // uplink the link is keyed by our own id.
    let link_peer = if current.role.is_base_station() {
        allocation.target_peer
    } else {
        current.own_id
    };
    let link = current.dynamic.link(link_peer)?;

    let mcs_index = if current.role.is_base_station() {
        link.mcs_downlink
    } else {
        link.mcs_uplink
    };
    let modulation = modulation_for_mcs(mcs_index);

    let budget = bit_capacity(current.numerology, &allocation, &link.mimo, modulation) / 8;
    trace!("Scheduled {} bytes for peer {}", budget, allocation.target_peer);

    let destination = if current.role.is_base_station() {
        allocation.target_peer
    } else {
        PeerId::BASE_STATION
    };
    let mut mux = Multiplexer::new(budget, source, destination);
    aggregate(&mut mux, buffers, buffer_peer);

    if mux.is_empty() {
        return None;
    }

    let mut pdu = MacPdu::new(
        current.numerology,
        MacPduCtl {
            sequence_number: 0,
            subframe_number: subframe,
            last_tb_in_subframe: true,
            first_tb_in_subframe: true,
        },
        allocation,
        link.mimo,
        McsConfig {
            modulation,
            power_offset: 0,
            num_info_bytes: 0,
            num_coded_bytes: budget,
        },
    );
    mux.build_pdu(&mut pdu.mac_data);
    pdu.mcs.num_info_bytes = pdu.mac_data.len();
    Some(pdu)
}

/// Schedule the next downlink subframe at the base station.
///
/// Returns the PDUs to hand to the PHY, in peer-selection order. An empty
/// result means no SubframeTx.Start may be emitted.
pub fn schedule_bs(
    current: &CurrentParameters,
    buffers: &mut SduBuffers,
    subframe: u32,
) -> Vec<MacPdu> {
    let Some(spans) = partition_spectrum(current.dynamic.fusion_lut) else {
        warn!("All TV channels are busy");
        return Vec::new();
    };

    let mut peers: Vec<PeerId> = buffers
        .bsi_snapshot()
        .into_iter()
        .map(|(peer, _)| peer)
        .collect();
    if peers.is_empty() {
        return Vec::new();
    }
    debug!("Selected {} UEs for next transmission", peers.len());

    // The partitioner always operates on two recipients; a sole peer is
    // duplicated so it receives both halves of the idle spectrum.
    if peers.len() == 1 {
        peers.push(peers[0]);
    }
    peers.truncate(2);

    let mut pdus: Vec<MacPdu> = peers
        .iter()
        .zip(spans)
        .filter_map(|(&peer, (first_rb, number_of_rb))| {
            let allocation = Allocation {
                target_peer: peer,
                first_rb,
                number_of_rb,
            };
            fill_pdu(
                current,
                buffers,
                allocation,
                PeerId::BASE_STATION,
                peer,
                subframe,
            )
        })
        .collect();

    let count = pdus.len();
    for (index, pdu) in pdus.iter_mut().enumerate() {
        pdu.ctl.sequence_number = index as u8;
        pdu.ctl.first_tb_in_subframe = index == 0;
        pdu.ctl.last_tb_in_subframe = index == count - 1;
    }

    pdus
}

/// Schedule the next uplink subframe at a user equipment: one PDU for the
/// assigned uplink reservation.
pub fn schedule_ue(
    current: &CurrentParameters,
    buffers: &mut SduBuffers,
    subframe: u32,
) -> Option<MacPdu> {
    let allocation = current.dynamic.link(current.own_id)?.ul_reservation;
    fill_pdu(
        current,
        buffers,
        allocation,
        current.own_id,
        PeerId::BASE_STATION,
        subframe,
    )
}
