//! The adaptive parameter store and its persisted text image.
//!
//! [`DynamicParameters`] holds everything that can change while the system
//! runs: the fusion LUT, per-peer reservations, MCS indices, MIMO setup and
//! power control. The CLI, link adaptation and Cosora stage their changes
//! into one instance; the reconfiguration step copies the staging into
//! [`CurrentParameters`], the snapshot every subframe is scheduled from.
//!
//! The persisted form is the classic one-integer-per-line text image, read
//! from `Default.txt` at first start and written back to `Current.txt` on
//! every reconfiguration. The [`ParamStore`] trait is the seam to the host
//! filesystem.

use alloc::{string::String, vec, vec::Vec};
use core::fmt::Write;

use crate::{
    serdes::{Serdes, SerdesError},
    wire::{Allocation, MimoConfig, MimoScheme},
    MacRole, PeerId,
};

/// Per-peer adaptive link settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLink {
    pub ul_reservation: Allocation,
    /// 4-bit MCS index for the downlink to this peer.
    pub mcs_downlink: u8,
    /// 4-bit MCS index for the uplink from this peer.
    pub mcs_uplink: u8,
    pub mimo: MimoConfig,
    /// 6-bit transmission power control value.
    pub tpc: u8,
}

impl Default for PeerLink {
    fn default() -> Self {
        Self {
            ul_reservation: Allocation::default(),
            mcs_downlink: 0,
            mcs_uplink: 0,
            mimo: MimoConfig::default(),
            tpc: 0,
        }
    }
}

/// The mutable, staged side of the parameter store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DynamicParameters {
    /// Fusion spectrum analysis LUT: 4 bits, one per TV channel, 1 = idle.
    pub fusion_lut: u8,
    /// Subframes between reception-metric reports.
    pub rx_metric_periodicity: u8,
    peers: Vec<(PeerId, PeerLink)>,
}

impl DynamicParameters {
    pub fn new(
        fusion_lut: u8,
        rx_metric_periodicity: u8,
        peers: Vec<(PeerId, PeerLink)>,
    ) -> Self {
        Self {
            fusion_lut,
            rx_metric_periodicity,
            peers,
        }
    }

    pub fn link(&self, peer: PeerId) -> Option<&PeerLink> {
        self.peers
            .iter()
            .find(|(id, _)| *id == peer)
            .map(|(_, link)| link)
    }

    pub fn link_mut(&mut self, peer: PeerId) -> Option<&mut PeerLink> {
        self.peers
            .iter_mut()
            .find(|(id, _)| *id == peer)
            .map(|(_, link)| link)
    }

    /// Peer ids in insertion order.
    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().map(|(id, _)| *id)
    }

    /// Peer links in insertion order.
    pub fn links(&self) -> impl Iterator<Item = (PeerId, &PeerLink)> + '_ {
        self.peers.iter().map(|(id, link)| (*id, link))
    }

    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }

    /// Serialize the MACC parameter-push SDU for one peer.
    ///
    /// Layout (appended in this order): one byte with the uplink MCS in
    /// the low nibble and the metric periodicity in the high nibble, the
    /// uplink reservation, the MIMO record, the TPC byte.
    pub fn serialize_for_peer(&self, peer: PeerId) -> Option<Vec<u8>> {
        let link = self.link(peer)?;

        let mut bytes = Vec::new();
        ((link.mcs_uplink & 15) | ((self.rx_metric_periodicity & 15) << 4)).append(&mut bytes);
        link.ul_reservation.append(&mut bytes);
        link.mimo.append(&mut bytes);
        link.tpc.append(&mut bytes);
        Some(bytes)
    }

    /// Apply a MACC parameter push received from the base station. The
    /// store ends up holding exactly the one pushed entry, keyed by the
    /// reservation's target id.
    pub fn apply_peer_push(&mut self, sdu: &[u8]) -> Result<(), SerdesError> {
        let mut bytes = sdu.to_vec();

        let tpc = u8::take(&mut bytes)?;
        let mimo = MimoConfig::take(&mut bytes)?;
        let ul_reservation = Allocation::take(&mut bytes)?;
        let auxiliary = u8::take(&mut bytes)?;

        self.rx_metric_periodicity = auxiliary >> 4;

        let mcs_downlink = self
            .link(ul_reservation.target_peer)
            .map(|link| link.mcs_downlink)
            .unwrap_or(0);
        self.peers = vec![(
            ul_reservation.target_peer,
            PeerLink {
                ul_reservation,
                mcs_downlink,
                mcs_uplink: auxiliary & 15,
                mimo,
                tpc,
            },
        )];

        Ok(())
    }
}

/// Error raised when a persisted parameter image cannot be parsed. Fatal:
/// the MAC refuses to configure itself from a broken image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigInvalid {
    /// 1-based line at which parsing failed.
    pub line: usize,
}

impl core::fmt::Display for ConfigInvalid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "parameter file invalid at line {}", self.line)
    }
}

impl core::error::Error for ConfigInvalid {}

/// The applied snapshot: static settings plus the last-applied dynamic
/// parameters. Everything the scheduler and the protocol control read
/// comes from here.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentParameters {
    pub role: MacRole,
    /// This terminal's own id: 0 at the base station, the assigned UE id
    /// at a user equipment.
    pub own_id: PeerId,
    pub numerology: u8,
    /// Waveform kind: false = OFDM, true = GFDM.
    pub gfdm: bool,
    pub mtu: u16,
    /// Data-SDU lifetime in subframes.
    pub ip_timeout: u16,
    /// Spectrum-sensing fusion window in subframes. 0 disables Cosora.
    pub ss_report_wait_timeout: u16,
    /// Acknowledgement wait in subframes.
    pub ack_wait_timeout: u16,
    /// Resource block group size.
    pub rbg_size: u8,
    pub dynamic: DynamicParameters,
    /// Set while the UEs have not yet been told about changed parameters.
    pub ues_outdated: bool,
}

impl CurrentParameters {
    /// The peers SDU buffers are kept for: the served UEs at the base
    /// station, the single base station at a UE.
    pub fn buffer_peers(&self) -> Vec<PeerId> {
        match self.role {
            MacRole::BaseStation => self.dynamic.peer_ids().collect(),
            MacRole::UserEquipment => vec![PeerId::BASE_STATION],
        }
    }

    pub fn num_ues(&self) -> u8 {
        match self.role {
            MacRole::BaseStation => self.dynamic.num_peers() as u8,
            MacRole::UserEquipment => 1,
        }
    }

    /// Copy the staged dynamic parameters over the applied snapshot.
    pub fn apply_dynamic(&mut self, staged: &DynamicParameters) {
        self.dynamic = staged.clone();
    }

    /// Parse a persisted text image. Lines hold one integer each, in
    /// declaration order; lines marked base-station-only are absent from a
    /// UE image. Trailing whitespace is tolerated.
    pub fn parse(text: &str) -> Result<Self, ConfigInvalid> {
        let mut lines = NumberedLines::new(text);

        let role = if lines.next_int::<u8>()? == 1 {
            MacRole::BaseStation
        } else {
            MacRole::UserEquipment
        };
        let num_ues: u8 = match role {
            MacRole::BaseStation => lines.next_int()?,
            MacRole::UserEquipment => 1,
        };
        let numerology: u8 = lines.next_int()?;
        let gfdm = lines.next_int::<u8>()? == 1;
        let fusion_lut: u8 = match role {
            MacRole::BaseStation => lines.next_int()?,
            MacRole::UserEquipment => 0,
        };
        let rx_metric_periodicity: u8 = lines.next_int()?;
        let mtu: u16 = lines.next_int()?;
        let ip_timeout: u16 = lines.next_int()?;
        let (ss_report_wait_timeout, ack_wait_timeout, rbg_size) = match role {
            MacRole::BaseStation => (
                lines.next_int()?,
                lines.next_int()?,
                lines.next_int()?,
            ),
            MacRole::UserEquipment => (0, 0, 0),
        };

        if numerology as usize >= crate::consts::NUMEROLOGY.len() {
            return Err(lines.invalid());
        }

        let mut peers = Vec::with_capacity(num_ues as usize);
        for _ in 0..num_ues {
            let target: u8 = lines.next_int()?;
            let first_rb: u8 = lines.next_int()?;
            let number_of_rb: u8 = lines.next_int()?;
            let mcs_downlink: u8 = match role {
                MacRole::BaseStation => lines.next_int()?,
                MacRole::UserEquipment => 0,
            };
            let mcs_uplink: u8 = lines.next_int()?;
            let scheme = MimoScheme::try_from(lines.next_int::<u32>()?)
                .map_err(|_| lines.invalid())?;
            let num_tx_antennas: u8 = lines.next_int()?;
            let precoding_matrix: u8 = lines.next_int()?;
            let tpc: u8 = lines.next_int()?;

            let target_peer = PeerId::try_from(target).map_err(|_| lines.invalid())?;
            let ul_reservation = Allocation {
                target_peer,
                first_rb,
                number_of_rb,
            };
            if !ul_reservation.is_valid() {
                return Err(lines.invalid());
            }

            peers.push((
                target_peer,
                PeerLink {
                    ul_reservation,
                    mcs_downlink,
                    mcs_uplink,
                    mimo: MimoConfig {
                        scheme,
                        num_tx_antennas,
                        precoding_matrix,
                    },
                    tpc,
                },
            ));
        }

        let own_id = match role {
            MacRole::BaseStation => PeerId::BASE_STATION,
            MacRole::UserEquipment => peers
                .first()
                .map(|(id, _)| *id)
                .ok_or_else(|| lines.invalid())?,
        };

        Ok(Self {
            role,
            own_id,
            numerology,
            gfdm,
            mtu,
            ip_timeout,
            ss_report_wait_timeout,
            ack_wait_timeout,
            rbg_size,
            dynamic: DynamicParameters::new(fusion_lut, rx_metric_periodicity, peers),
            ues_outdated: false,
        })
    }

    /// Render the text image written back to `Current.txt`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let bs = self.role.is_base_station();

        let _ = writeln!(out, "{}", bs as u8);
        if bs {
            let _ = writeln!(out, "{}", self.num_ues());
        }
        let _ = writeln!(out, "{}", self.numerology);
        let _ = writeln!(out, "{}", self.gfdm as u8);
        if bs {
            let _ = writeln!(out, "{}", self.dynamic.fusion_lut);
        }
        let _ = writeln!(out, "{}", self.dynamic.rx_metric_periodicity);
        let _ = writeln!(out, "{}", self.mtu);
        let _ = writeln!(out, "{}", self.ip_timeout);
        if bs {
            let _ = writeln!(out, "{}", self.ss_report_wait_timeout);
            let _ = writeln!(out, "{}", self.ack_wait_timeout);
            let _ = writeln!(out, "{}", self.rbg_size);
        }

        for (_, link) in self.dynamic.links() {
            let _ = writeln!(out, "{}", link.ul_reservation.target_peer.value());
            let _ = writeln!(out, "{}", link.ul_reservation.first_rb);
            let _ = writeln!(out, "{}", link.ul_reservation.number_of_rb);
            if bs {
                let _ = writeln!(out, "{}", link.mcs_downlink);
            }
            let _ = writeln!(out, "{}", link.mcs_uplink);
            let _ = writeln!(out, "{}", link.mimo.scheme as u32);
            let _ = writeln!(out, "{}", link.mimo.num_tx_antennas);
            let _ = writeln!(out, "{}", link.mimo.precoding_matrix);
            let _ = writeln!(out, "{}", link.tpc);
        }

        out
    }
}

/// Persistence seam for the parameter images.
///
/// `Default.txt` is the immutable factory image; `Current.txt` is the last
/// applied one and is overwritten on every reconfiguration.
pub trait ParamStore {
    type Error: core::fmt::Debug;

    fn load_default(&mut self) -> Result<String, Self::Error>;
    fn load_current(&mut self) -> Result<String, Self::Error>;
    fn store_current(&mut self, image: &str) -> Result<(), Self::Error>;
}

struct NumberedLines<'a> {
    inner: core::str::Lines<'a>,
    number: usize,
}

impl<'a> NumberedLines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines(),
            number: 0,
        }
    }

    fn next_int<T: core::str::FromStr>(&mut self) -> Result<T, ConfigInvalid> {
        self.number += 1;
        self.inner
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or(ConfigInvalid { line: self.number })
    }

    fn invalid(&self) -> ConfigInvalid {
        ConfigInvalid { line: self.number }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn bs_parameters() -> CurrentParameters {
        let peers = vec![
            (
                PeerId::from_nibble(1),
                PeerLink {
                    ul_reservation: Allocation {
                        target_peer: PeerId::from_nibble(1),
                        first_rb: 0,
                        number_of_rb: 66,
                    },
                    mcs_downlink: 9,
                    mcs_uplink: 9,
                    mimo: MimoConfig::default(),
                    tpc: 1,
                },
            ),
            (
                PeerId::from_nibble(2),
                PeerLink {
                    ul_reservation: Allocation {
                        target_peer: PeerId::from_nibble(2),
                        first_rb: 66,
                        number_of_rb: 66,
                    },
                    mcs_downlink: 9,
                    mcs_uplink: 9,
                    mimo: MimoConfig::default(),
                    tpc: 1,
                },
            ),
        ];

        CurrentParameters {
            role: MacRole::BaseStation,
            own_id: PeerId::BASE_STATION,
            numerology: 0,
            gfdm: true,
            mtu: 1500,
            ip_timeout: 10,
            ss_report_wait_timeout: 10,
            ack_wait_timeout: 10,
            rbg_size: 1,
            dynamic: DynamicParameters::new(0b1111, 5, peers),
            ues_outdated: false,
        }
    }

    #[test]
    fn bs_image_round_trip() {
        let parameters = bs_parameters();
        let image = parameters.render();
        let restored = CurrentParameters::parse(&image).unwrap();
        assert_eq!(restored, parameters);
    }

    #[test]
    fn ue_image_round_trip() {
        let own = PeerId::from_nibble(1);
        let parameters = CurrentParameters {
            role: MacRole::UserEquipment,
            own_id: own,
            numerology: 2,
            gfdm: false,
            mtu: 1500,
            ip_timeout: 8,
            ss_report_wait_timeout: 0,
            ack_wait_timeout: 0,
            rbg_size: 0,
            dynamic: DynamicParameters::new(
                0,
                5,
                vec![(
                    own,
                    PeerLink {
                        ul_reservation: Allocation {
                            target_peer: own,
                            first_rb: 99,
                            number_of_rb: 33,
                        },
                        mcs_downlink: 0,
                        mcs_uplink: 12,
                        mimo: MimoConfig::default(),
                        tpc: 3,
                    },
                )],
            ),
            ues_outdated: false,
        };

        let image = parameters.render();
        let restored = CurrentParameters::parse(&image).unwrap();
        assert_eq!(restored, parameters);
        assert_eq!(restored.buffer_peers(), vec![PeerId::BASE_STATION]);
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        let image = bs_parameters().render();
        let padded: String = image.lines().map(|line| alloc::format!("{line} \t\n")).collect();
        assert_eq!(
            CurrentParameters::parse(&padded).unwrap(),
            bs_parameters()
        );
    }

    #[test]
    fn broken_images_name_the_line() {
        let mut image = bs_parameters().render();
        image = image.replacen("1500", "fifteen-hundred", 1);
        let err = CurrentParameters::parse(&image).unwrap_err();
        assert_eq!(err.line, 7);

        assert!(CurrentParameters::parse("").is_err());
    }

    #[test]
    fn peer_push_round_trip() {
        let parameters = bs_parameters();
        let peer = PeerId::from_nibble(2);
        let sdu = parameters.dynamic.serialize_for_peer(peer).unwrap();

        let mut ue_side = DynamicParameters::default();
        ue_side.apply_peer_push(&sdu).unwrap();

        assert_eq!(ue_side.rx_metric_periodicity, 5);
        let link = ue_side.link(peer).unwrap();
        assert_eq!(link.mcs_uplink, 9);
        assert_eq!(link.tpc, 1);
        assert_eq!(
            link.ul_reservation,
            parameters.dynamic.link(peer).unwrap().ul_reservation
        );
    }

    #[test]
    fn peer_push_nibble_packing() {
        let parameters = bs_parameters();
        let sdu = parameters
            .dynamic
            .serialize_for_peer(PeerId::from_nibble(1))
            .unwrap();
        // Low nibble uplink MCS 9, high nibble periodicity 5.
        assert_eq!(sdu[0], 0b0101_1001);
    }
}
