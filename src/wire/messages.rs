//! Control messages exchanged with the PHY and the MACC SDU bodies.
//!
//! Every interlayer message leads with a one-byte opcode; the serialized
//! parameters (if any) follow it, so a receiver pops the parameter record
//! off the tail and is left with the opcode in front.

use alloc::{vec, vec::Vec};

use super::{take_snr_seq, Allocation, RxMetrics, SnrPerRb};
use crate::serdes::{append_seq, Serdes, SerdesError};

pub mod opcode {
    /// PHYConfig.Request / PHYConfig.Response
    pub const PHY_CONFIG: u8 = b'A';
    /// PHYStop.Request / PHYStop.Response
    pub const PHY_STOP: u8 = b'B';
    /// BSSubframeRx.Start / BSSubframeTx.Start (direction given by channel)
    pub const BS_SUBFRAME_START: u8 = b'C';
    /// UESubframeRx.Start / UESubframeTx.Start
    pub const UE_SUBFRAME_START: u8 = b'D';
    /// Subframe.End
    pub const SUBFRAME_END: u8 = b'E';
    /// PHYTx.Indication; with a second byte it delivers a fusion LUT to PHY
    pub const TX_INDICATION: u8 = b'F';
}

/// Opcode of the reception-metric report MACC SDU (UE to BS).
pub const MACC_RX_METRICS: u8 = b'1';
/// Opcode of the parameter acknowledgement MACC SDU (UE to BS).
pub const MACC_ACK: u8 = b'2';

/// Parameters of BSSubframeTx.Start, announcing the next downlink subframe
/// to the PHY.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BsSubframeTxStart {
    /// Number of distinct UEs served in the subframe.
    pub num_ues: u8,
    /// Number of MAC PDUs that follow on the PDU channel.
    pub num_pdus: u8,
    /// Uplink reservation for each served UE.
    pub ul_reservations: Vec<Allocation>,
    pub numerology: u8,
    /// Waveform kind: false = OFDM, true = GFDM.
    pub gfdm: bool,
    /// Fusion spectrum analysis LUT currently in force.
    pub fusion_lut: u8,
    /// Subframes between reception-metric reports.
    pub rx_metric_periodicity: u8,
}

impl Serdes for BsSubframeTxStart {
    fn append(&self, bytes: &mut Vec<u8>) {
        self.num_ues.append(bytes);
        self.num_pdus.append(bytes);
        for reservation in &self.ul_reservations {
            reservation.append(bytes);
        }
        // High nibble numerology, low nibble fusion LUT.
        (((self.numerology & 15) << 4) | (self.fusion_lut & 15)).append(bytes);
        // MSB waveform kind, low nibble metric periodicity.
        (((self.gfdm as u8) << 7) | (self.rx_metric_periodicity & 15)).append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let auxiliary = u8::take(bytes)?;
        let rx_metric_periodicity = auxiliary & 15;
        let gfdm = auxiliary >> 7 == 1;

        let auxiliary = u8::take(bytes)?;
        let numerology = (auxiliary >> 4) & 15;
        let fusion_lut = auxiliary & 15;

        // What remains is the two fixed bytes plus 3 bytes per reservation.
        if bytes.len() < 2 || (bytes.len() - 2) % 3 != 0 {
            return Err(SerdesError::Truncated);
        }
        let count = (bytes.len() - 2) / 3;
        let mut ul_reservations = vec![Allocation::default(); count];
        for slot in ul_reservations.iter_mut().rev() {
            *slot = Allocation::take(bytes)?;
        }

        let num_pdus = u8::take(bytes)?;
        let num_ues = u8::take(bytes)?;

        Ok(Self {
            num_ues,
            num_pdus,
            ul_reservations,
            numerology,
            gfdm,
            fusion_lut,
            rx_metric_periodicity,
        })
    }
}

/// Parameters of UESubframeTx.Start, announcing the next uplink subframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UeSubframeTxStart {
    pub ul_reservation: Allocation,
    pub numerology: u8,
    pub gfdm: bool,
    pub rx_metric_periodicity: u8,
}

impl Serdes for UeSubframeTxStart {
    fn append(&self, bytes: &mut Vec<u8>) {
        self.ul_reservation.append(bytes);
        (((self.gfdm as u8) << 7)
            | ((self.numerology & 7) << 4)
            | (self.rx_metric_periodicity & 15))
            .append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let auxiliary = u8::take(bytes)?;
        let rx_metric_periodicity = auxiliary & 15;
        let numerology = (auxiliary >> 4) & 7;
        let gfdm = auxiliary >> 7 == 1;
        let ul_reservation = Allocation::take(bytes)?;
        Ok(Self {
            ul_reservation,
            numerology,
            gfdm,
            rx_metric_periodicity,
        })
    }
}

/// Parameters of BSSubframeRx.Start: metrics the BS PHY measured on the
/// uplink transmission it is about to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BsSubframeRxStart {
    pub snr: f32,
}

impl Serdes for BsSubframeRxStart {
    fn append(&self, bytes: &mut Vec<u8>) {
        self.snr.append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        Ok(Self {
            snr: f32::take(bytes)?,
        })
    }
}

/// Parameters of UESubframeRx.Start: downlink metrics plus the raw
/// spectrum sensing measurement from the UE PHY.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UeSubframeRxStart {
    /// SNR per resource block.
    pub snr: SnrPerRb,
    /// Spectrum sensing measurement, one bit per TV channel.
    pub ssm: u8,
    pub num_pdus: u8,
}

impl Serdes for UeSubframeRxStart {
    fn append(&self, bytes: &mut Vec<u8>) {
        self.ssm.append(bytes);
        self.num_pdus.append(bytes);
        append_seq(bytes, &self.snr);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let snr = take_snr_seq(bytes)?;
        let num_pdus = u8::take(bytes)?;
        let ssm = u8::take(bytes)?;
        Ok(Self {
            snr,
            ssm,
            num_pdus,
        })
    }
}

/// A control message received from the PHY, classified by opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    ConfigResponse,
    StopResponse,
    /// BSSubframeRx.Start; metrics are present when the message carries
    /// parameters.
    BsRxStart(Option<BsSubframeRxStart>),
    /// UESubframeRx.Start; same convention.
    UeRxStart(Option<UeSubframeRxStart>),
    SubframeEnd,
    TxIndication,
    Unknown(u8),
}

impl ControlMessage {
    pub fn parse(message: &[u8]) -> Result<Self, SerdesError> {
        let Some((&op, parameters)) = message.split_first() else {
            return Err(SerdesError::Truncated);
        };

        Ok(match op {
            opcode::PHY_CONFIG => ControlMessage::ConfigResponse,
            opcode::PHY_STOP => ControlMessage::StopResponse,
            opcode::BS_SUBFRAME_START if parameters.is_empty() => ControlMessage::BsRxStart(None),
            opcode::BS_SUBFRAME_START => {
                let mut parameters = parameters.to_vec();
                ControlMessage::BsRxStart(Some(BsSubframeRxStart::take(&mut parameters)?))
            }
            opcode::UE_SUBFRAME_START if parameters.is_empty() => ControlMessage::UeRxStart(None),
            opcode::UE_SUBFRAME_START => {
                let mut parameters = parameters.to_vec();
                ControlMessage::UeRxStart(Some(UeSubframeRxStart::take(&mut parameters)?))
            }
            opcode::SUBFRAME_END => ControlMessage::SubframeEnd,
            opcode::TX_INDICATION => ControlMessage::TxIndication,
            other => ControlMessage::Unknown(other),
        })
    }
}

/// Encode PHYConfig.Request.
pub fn config_request() -> Vec<u8> {
    vec![opcode::PHY_CONFIG]
}

/// Encode PHYStop.Request.
pub fn stop_request() -> Vec<u8> {
    vec![opcode::PHY_STOP]
}

/// Encode Subframe.End.
pub fn subframe_end() -> Vec<u8> {
    vec![opcode::SUBFRAME_END]
}

/// Encode the fusion-LUT push to the PHY.
pub fn fusion_lut_update(fusion_lut: u8) -> Vec<u8> {
    vec![opcode::TX_INDICATION, fusion_lut & 15]
}

/// Encode BSSubframeTx.Start.
pub fn bs_tx_start(parameters: &BsSubframeTxStart) -> Vec<u8> {
    let mut message = vec![opcode::BS_SUBFRAME_START];
    parameters.append(&mut message);
    message
}

/// Encode UESubframeTx.Start.
pub fn ue_tx_start(parameters: &UeSubframeTxStart) -> Vec<u8> {
    let mut message = vec![opcode::UE_SUBFRAME_START];
    parameters.append(&mut message);
    message
}

/// Encode the reception-metric report MACC SDU.
pub fn rx_metrics_sdu(metrics: &RxMetrics) -> Vec<u8> {
    let mut sdu = vec![MACC_RX_METRICS];
    metrics.append(&mut sdu);
    sdu
}

/// Encode the parameter acknowledgement MACC SDU.
pub fn ack_sdu() -> Vec<u8> {
    vec![MACC_ACK]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeerId;

    #[test]
    fn bs_tx_start_round_trip() {
        let parameters = BsSubframeTxStart {
            num_ues: 2,
            num_pdus: 2,
            ul_reservations: vec![
                Allocation {
                    target_peer: PeerId::from_nibble(1),
                    first_rb: 0,
                    number_of_rb: 66,
                },
                Allocation {
                    target_peer: PeerId::from_nibble(2),
                    first_rb: 66,
                    number_of_rb: 66,
                },
            ],
            numerology: 3,
            gfdm: true,
            fusion_lut: 0b1111,
            rx_metric_periodicity: 5,
        };

        let message = bs_tx_start(&parameters);
        assert_eq!(message[0], opcode::BS_SUBFRAME_START);

        let mut payload = message[1..].to_vec();
        assert_eq!(BsSubframeTxStart::take(&mut payload).unwrap(), parameters);
        assert!(payload.is_empty());
    }

    #[test]
    fn bs_tx_start_nibble_packing() {
        let parameters = BsSubframeTxStart {
            numerology: 0b0101,
            fusion_lut: 0b1010,
            gfdm: true,
            rx_metric_periodicity: 0b0011,
            ..Default::default()
        };

        let message = bs_tx_start(&parameters);
        let len = message.len();
        assert_eq!(message[len - 2], 0b0101_1010);
        assert_eq!(message[len - 1], 0b1000_0011);
    }

    #[test]
    fn ue_tx_start_round_trip() {
        let parameters = UeSubframeTxStart {
            ul_reservation: Allocation {
                target_peer: PeerId::from_nibble(1),
                first_rb: 99,
                number_of_rb: 33,
            },
            numerology: 2,
            gfdm: false,
            rx_metric_periodicity: 10,
        };

        let message = ue_tx_start(&parameters);
        let mut payload = message[1..].to_vec();
        assert_eq!(UeSubframeTxStart::take(&mut payload).unwrap(), parameters);
        assert!(payload.is_empty());
    }

    #[test]
    fn rx_start_parse() {
        assert_eq!(
            ControlMessage::parse(&[opcode::BS_SUBFRAME_START]).unwrap(),
            ControlMessage::BsRxStart(None)
        );

        let mut message = vec![opcode::BS_SUBFRAME_START];
        BsSubframeRxStart { snr: 7.5 }.append(&mut message);
        assert_eq!(
            ControlMessage::parse(&message).unwrap(),
            ControlMessage::BsRxStart(Some(BsSubframeRxStart { snr: 7.5 }))
        );
    }

    #[test]
    fn bare_opcodes_parse() {
        assert_eq!(
            ControlMessage::parse(&config_request()).unwrap(),
            ControlMessage::ConfigResponse
        );
        assert_eq!(
            ControlMessage::parse(&stop_request()).unwrap(),
            ControlMessage::StopResponse
        );
        assert_eq!(
            ControlMessage::parse(&subframe_end()).unwrap(),
            ControlMessage::SubframeEnd
        );
        assert_eq!(
            ControlMessage::parse(&[opcode::TX_INDICATION]).unwrap(),
            ControlMessage::TxIndication
        );
        assert_eq!(
            ControlMessage::parse(&[b'Z']).unwrap(),
            ControlMessage::Unknown(b'Z')
        );
    }

    #[test]
    fn fusion_lut_update_layout() {
        assert_eq!(fusion_lut_update(0b1010), [opcode::TX_INDICATION, 0b1010]);
        // Only the low nibble is a LUT.
        assert_eq!(fusion_lut_update(0xFF), [opcode::TX_INDICATION, 0x0F]);
    }
}
