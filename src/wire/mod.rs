//! The records that cross the MAC/PHY boundary.
//!
//! Field widths are fixed for interoperability: `u8` for addresses and
//! resource-block counts, `u32` for counters typed `unsigned` on the peer,
//! `u64` for sizes, `f32` for metrics, and `u32` for enum discriminants.
//! Layouts must not change without a coordinated update of both roles.

use alloc::vec::Vec;

use crate::{
    consts::MAX_NUM_RB,
    serdes::{append_payload, append_seq, take_payload, Serdes, SerdesError},
    PeerId,
};

pub mod messages;

/// Per-resource-block SNR readings; the band bounds the length.
pub type SnrPerRb = heapless::Vec<f32, { MAX_NUM_RB as usize }>;

/// Take a length-suffixed per-RB float sequence from the tail.
pub(crate) fn take_snr_seq(bytes: &mut Vec<u8>) -> Result<SnrPerRb, SerdesError> {
    let len = u64::take(bytes)? as usize;
    if len > MAX_NUM_RB as usize {
        return Err(SerdesError::InvalidValue);
    }

    let mut snr = SnrPerRb::new();
    for _ in 0..len {
        // Capacity was checked against the length suffix.
        let _ = snr.push(f32::take(bytes)?);
    }
    snr.reverse();
    Ok(snr)
}

/// A contiguous span of resource blocks granted to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Allocation {
    pub target_peer: PeerId,
    pub first_rb: u8,
    pub number_of_rb: u8,
}

impl Allocation {
    /// An allocation is only meaningful when it stays inside the band.
    pub fn is_valid(&self) -> bool {
        self.first_rb as u16 + self.number_of_rb as u16 <= crate::consts::MAX_NUM_RB as u16
    }
}

impl Default for Allocation {
    fn default() -> Self {
        Self {
            target_peer: PeerId::BROADCAST,
            first_rb: 0,
            number_of_rb: crate::consts::MAX_NUM_RB,
        }
    }
}

impl Serdes for Allocation {
    fn append(&self, bytes: &mut Vec<u8>) {
        self.target_peer.value().append(bytes);
        self.first_rb.append(bytes);
        self.number_of_rb.append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let number_of_rb = u8::take(bytes)?;
        let first_rb = u8::take(bytes)?;
        let target_peer = PeerId::from_nibble(u8::take(bytes)?);
        Ok(Self {
            target_peer,
            first_rb,
            number_of_rb,
        })
    }
}

/// Antenna scheme for a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u32)]
pub enum MimoScheme {
    #[default]
    None = 0,
    Diversity = 1,
    Multiplexing = 2,
}

impl TryFrom<u32> for MimoScheme {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Diversity),
            2 => Ok(Self::Multiplexing),
            _ => Err(value),
        }
    }
}

/// MIMO configuration for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct MimoConfig {
    pub scheme: MimoScheme,
    pub num_tx_antennas: u8,
    pub precoding_matrix: u8,
}

impl Default for MimoConfig {
    fn default() -> Self {
        Self {
            scheme: MimoScheme::None,
            num_tx_antennas: 1,
            precoding_matrix: 0,
        }
    }
}

impl Serdes for MimoConfig {
    fn append(&self, bytes: &mut Vec<u8>) {
        (self.scheme as u32).append(bytes);
        (self.num_tx_antennas as u64).append(bytes);
        (self.precoding_matrix as u64).append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let precoding_matrix =
            u8::try_from(u64::take(bytes)?).map_err(|_| SerdesError::InvalidValue)?;
        let num_tx_antennas =
            u8::try_from(u64::take(bytes)?).map_err(|_| SerdesError::InvalidValue)?;
        let scheme =
            MimoScheme::try_from(u32::take(bytes)?).map_err(|_| SerdesError::InvalidValue)?;
        Ok(Self {
            scheme,
            num_tx_antennas,
            precoding_matrix,
        })
    }
}

/// QAM modulation. The discriminant is the number of bits per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u32)]
pub enum Modulation {
    #[default]
    Qpsk = 2,
    Qam16 = 4,
    Qam64 = 6,
    Qam256 = 8,
}

impl Modulation {
    pub const fn bits_per_symbol(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Modulation {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Qpsk),
            4 => Ok(Self::Qam16),
            6 => Ok(Self::Qam64),
            8 => Ok(Self::Qam256),
            _ => Err(value),
        }
    }
}

/// Modulation and coding configuration of one transport block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct McsConfig {
    pub modulation: Modulation,
    /// Power offset in dB for the transmission.
    pub power_offset: u8,
    /// Number of information bytes carried, including the CRC trailer.
    pub num_info_bytes: usize,
    /// Number of coded bytes the allocation can hold.
    pub num_coded_bytes: usize,
}

impl Serdes for McsConfig {
    fn append(&self, bytes: &mut Vec<u8>) {
        (self.modulation as u32).append(bytes);
        (self.power_offset as u64).append(bytes);
        (self.num_info_bytes as u64).append(bytes);
        (self.num_coded_bytes as u64).append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let num_coded_bytes = u64::take(bytes)? as usize;
        let num_info_bytes = u64::take(bytes)? as usize;
        let power_offset =
            u8::try_from(u64::take(bytes)?).map_err(|_| SerdesError::InvalidValue)?;
        let modulation =
            Modulation::try_from(u32::take(bytes)?).map_err(|_| SerdesError::InvalidValue)?;
        Ok(Self {
            modulation,
            power_offset,
            num_info_bytes,
            num_coded_bytes,
        })
    }
}

/// MAC to PHY control fields of one transport block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct MacPduCtl {
    /// Position of this transport block within the subframe. Resets to
    /// zero every subframe.
    pub sequence_number: u8,
    pub subframe_number: u32,
    pub last_tb_in_subframe: bool,
    pub first_tb_in_subframe: bool,
}

impl Serdes for MacPduCtl {
    fn append(&self, bytes: &mut Vec<u8>) {
        self.sequence_number.append(bytes);
        self.subframe_number.append(bytes);
        self.last_tb_in_subframe.append(bytes);
        self.first_tb_in_subframe.append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let first_tb_in_subframe = bool::take(bytes)?;
        let last_tb_in_subframe = bool::take(bytes)?;
        let subframe_number = u32::take(bytes)?;
        let sequence_number = u8::take(bytes)?;
        Ok(Self {
            sequence_number,
            subframe_number,
            last_tb_in_subframe,
            first_tb_in_subframe,
        })
    }
}

/// One transport block: the full configuration the PHY needs plus the
/// uncoded MAC payload (aggregated SDUs, MAC header and CRC trailer).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacPdu {
    pub numerology: u8,
    pub ctl: MacPduCtl,
    pub allocation: Allocation,
    pub mimo: MimoConfig,
    pub mcs: McsConfig,
    /// Average SNR the receiver saw on the *previous* transmission in the
    /// opposite direction. Feeds link adaptation at the base station.
    pub snr_avg: f32,
    pub rank_indicator: u8,
    pub mac_data: Vec<u8>,
}

impl MacPdu {
    pub fn new(
        numerology: u8,
        ctl: MacPduCtl,
        allocation: Allocation,
        mimo: MimoConfig,
        mcs: McsConfig,
    ) -> Self {
        Self {
            numerology,
            ctl,
            allocation,
            mimo,
            mcs,
            snr_avg: 10.0,
            rank_indicator: 10,
            mac_data: Vec::new(),
        }
    }
}

impl Serdes for MacPdu {
    fn append(&self, bytes: &mut Vec<u8>) {
        (self.numerology as u32).append(bytes);
        self.ctl.append(bytes);
        self.allocation.append(bytes);
        self.mimo.append(bytes);
        self.mcs.append(bytes);
        self.snr_avg.append(bytes);
        self.rank_indicator.append(bytes);
        append_payload(bytes, &self.mac_data);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let mac_data = take_payload(bytes)?;
        let rank_indicator = u8::take(bytes)?;
        let snr_avg = f32::take(bytes)?;
        let mcs = McsConfig::take(bytes)?;
        let mimo = MimoConfig::take(bytes)?;
        let allocation = Allocation::take(bytes)?;
        let ctl = MacPduCtl::take(bytes)?;
        let numerology =
            u8::try_from(u32::take(bytes)?).map_err(|_| SerdesError::InvalidValue)?;
        Ok(Self {
            numerology,
            ctl,
            allocation,
            mimo,
            mcs,
            snr_avg,
            rank_indicator,
            mac_data,
        })
    }
}

/// Reception metrics, kept per peer at the base station and for the single
/// base station at a user equipment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RxMetrics {
    /// SNR per resource block.
    pub snr: SnrPerRb,
    pub snr_avg: f32,
    pub rank_indicator: u8,
    /// Spectrum sensing report: 4 bits, one per TV channel, 1 = idle.
    pub ss_report: u8,
}

impl Serdes for RxMetrics {
    fn append(&self, bytes: &mut Vec<u8>) {
        append_seq(bytes, &self.snr);
        self.snr_avg.append(bytes);
        self.rank_indicator.append(bytes);
        self.ss_report.append(bytes);
    }

    fn take(bytes: &mut Vec<u8>) -> Result<Self, SerdesError> {
        let ss_report = u8::take(bytes)?;
        let rank_indicator = u8::take(bytes)?;
        let snr_avg = f32::take(bytes)?;
        let snr = take_snr_seq(bytes)?;
        Ok(Self {
            snr,
            snr_avg,
            rank_indicator,
            ss_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn sample_pdu() -> MacPdu {
        MacPdu {
            numerology: 2,
            ctl: MacPduCtl {
                sequence_number: 1,
                subframe_number: 77,
                last_tb_in_subframe: true,
                first_tb_in_subframe: false,
            },
            allocation: Allocation {
                target_peer: PeerId::from_nibble(3),
                first_rb: 66,
                number_of_rb: 33,
            },
            mimo: MimoConfig {
                scheme: MimoScheme::Multiplexing,
                num_tx_antennas: 2,
                precoding_matrix: 1,
            },
            mcs: McsConfig {
                modulation: Modulation::Qam64,
                power_offset: 3,
                num_info_bytes: 120,
                num_coded_bytes: 240,
            },
            snr_avg: 17.25,
            rank_indicator: 2,
            mac_data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        }
    }

    #[test]
    fn mac_pdu_round_trip() {
        let pdu = sample_pdu();
        let mut bytes = Vec::new();
        pdu.append(&mut bytes);

        let restored = MacPdu::take(&mut bytes).unwrap();
        assert_eq!(restored, pdu);
        assert!(bytes.is_empty(), "codec must consume exactly what it wrote");
    }

    #[test]
    fn concatenated_pdus_pop_in_reverse() {
        let mut first = sample_pdu();
        first.ctl.sequence_number = 0;
        let mut second = sample_pdu();
        second.ctl.sequence_number = 1;

        let mut bytes = Vec::new();
        first.append(&mut bytes);
        second.append(&mut bytes);

        // The tail codec yields the last-written record first.
        assert_eq!(MacPdu::take(&mut bytes).unwrap(), second);
        assert_eq!(MacPdu::take(&mut bytes).unwrap(), first);
        assert!(bytes.is_empty());
    }

    #[test]
    fn rx_metrics_round_trip() {
        let metrics = RxMetrics {
            snr: SnrPerRb::from_slice(&[12.0; 33]).unwrap(),
            snr_avg: 12.0,
            rank_indicator: 1,
            ss_report: 0b1011,
        };
        let mut bytes = Vec::new();
        metrics.append(&mut bytes);
        assert_eq!(RxMetrics::take(&mut bytes).unwrap(), metrics);
        assert!(bytes.is_empty());
    }

    #[test]
    fn invalid_discriminants_are_rejected() {
        let mut bytes = Vec::new();
        MimoConfig::default().append(&mut bytes);
        // Corrupt the scheme discriminant (first four bytes).
        bytes[0] = 9;
        assert_eq!(MimoConfig::take(&mut bytes), Err(SerdesError::InvalidValue));
    }
}
