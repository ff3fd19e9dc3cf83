//! An in-memory parameter store and canonical test parameter sets.

use std::string::String;

use crate::{
    params::{CurrentParameters, DynamicParameters, ParamStore, PeerLink},
    wire::{Allocation, MimoConfig},
    MacRole, PeerId,
};

/// Raised when an image was never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMissing;

/// Parameter persistence without a filesystem.
pub struct MemStore {
    default_image: String,
    current_image: Option<String>,
}

impl MemStore {
    /// A store whose factory image is the given parameter set.
    pub fn with_default(parameters: &CurrentParameters) -> Self {
        Self {
            default_image: parameters.render(),
            current_image: None,
        }
    }
}

impl ParamStore for MemStore {
    type Error = ImageMissing;

    fn load_default(&mut self) -> Result<String, Self::Error> {
        Ok(self.default_image.clone())
    }

    fn load_current(&mut self) -> Result<String, Self::Error> {
        self.current_image.clone().ok_or(ImageMissing)
    }

    fn store_current(&mut self, image: &str) -> Result<(), Self::Error> {
        self.current_image = Some(image.into());
        Ok(())
    }
}

/// A base station serving `num_ues` UEs with evenly split uplink
/// reservations, QAM16 links and fusion LUT `fusion_lut`.
pub fn default_bs_parameters(num_ues: u8, fusion_lut: u8) -> CurrentParameters {
    let peers = (1..=num_ues)
        .map(|id| {
            let peer = PeerId::from_nibble(id);
            (
                peer,
                PeerLink {
                    ul_reservation: Allocation {
                        target_peer: peer,
                        first_rb: (id - 1) * 33,
                        number_of_rb: 33,
                    },
                    mcs_downlink: 9,
                    mcs_uplink: 9,
                    mimo: MimoConfig::default(),
                    tpc: 1,
                },
            )
        })
        .collect();

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
        dynamic: DynamicParameters::new(fusion_lut, 5, peers),
        ues_outdated: false,
    }
}

/// A user equipment with the given id and uplink reservation.
pub fn default_ue_parameters(own_id: u8, ul_first_rb: u8, ul_number_of_rb: u8) -> CurrentParameters {
    let own = PeerId::from_nibble(own_id);
    CurrentParameters {
        role: MacRole::UserEquipment,
        own_id: own,
        numerology: 0,
        gfdm: true,
        mtu: 1500,
        ip_timeout: 10,
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
                        first_rb: ul_first_rb,
                        number_of_rb: ul_number_of_rb,
                    },
                    mcs_downlink: 0,
                    mcs_uplink: 9,
                    mimo: MimoConfig::default(),
                    tpc: 1,
                },
            )],
        ),
        ues_outdated: false,
    }
}
