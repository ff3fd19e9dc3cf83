//! The seam to the L1 transceiver.
//!
//! The PHY is an opaque peer reached over four ordered message channels:
//! PDUs down, PDUs up, control down, control up. An implementation may be
//! POSIX message queues, a socket pair or an in-memory stub; the MAC only
//! relies on the ordering and framing guarantees documented here.
//!
//! The CRC trailer around every PDU is handled at this layer: [`send_pdus`]
//! stamps it, [`receive_pdus`] checks it and drops PDUs that fail.

use alloc::vec::Vec;

use crate::{
    buffers::DropCounters,
    crc,
    serdes::Serdes,
    wire::MacPdu,
};

/// Channel names the host side must create.
pub const MQ_PDU_TO_PHY: &str = "/mqPduToPhy";
pub const MQ_PDU_FROM_PHY: &str = "/mqPduFromPhy";
pub const MQ_CONTROL_TO_PHY: &str = "/mqControlToPhy";
pub const MQ_CONTROL_FROM_PHY: &str = "/mqControlFromPhy";

/// Messages a channel can hold before the sender blocks.
pub const MESSAGE_QUEUE_DEPTH: usize = 100;

/// Upper bound on one message. A full subframe of PDUs must fit.
pub const MAX_MESSAGE_SIZE: usize = 204_800;

/// Transport to the L1 transceiver.
///
/// All four operations must be cancel-safe: the engine races the receive
/// operations against its other event sources. Implementations drain any
/// stale messages when the channels are opened.
pub trait Phy {
    #[cfg(not(feature = "defmt-03"))]
    type Error: core::error::Error;
    #[cfg(feature = "defmt-03")]
    type Error: core::error::Error + defmt::Format;

    /// Write one message on the PDU channel towards the PHY.
    async fn send_pdu_message(&mut self, message: Vec<u8>) -> Result<(), Self::Error>;

    /// Read the next message from the PDU channel out of the PHY.
    async fn receive_pdu_message(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Write one control message towards the PHY.
    async fn send_control(&mut self, message: Vec<u8>) -> Result<(), Self::Error>;

    /// Read the next control message out of the PHY.
    async fn receive_control(&mut self) -> Result<Vec<u8>, Self::Error>;
}

/// Stamp each PDU with its CRC trailer, serialize all of them into one
/// message and hand it to the PHY.
pub async fn send_pdus<P: Phy>(phy: &mut P, pdus: Vec<MacPdu>) -> Result<(), P::Error> {
    let mut message = Vec::new();

    for mut pdu in pdus {
        crc::append_crc(&mut pdu.mac_data);
        pdu.mcs.num_info_bytes += 2;
        pdu.append(&mut message);
    }

    trace!("Sending PDU message of {} bytes", message.len());
    phy.send_pdu_message(message).await
}

/// Read one message from the PHY and unpack every PDU in it, dropping the
/// ones whose CRC does not check.
///
/// The returned PDUs are in transmission order.
pub async fn receive_pdus<P: Phy>(
    phy: &mut P,
    counters: &mut DropCounters,
) -> Result<Vec<MacPdu>, P::Error> {
    let mut bytes = phy.receive_pdu_message().await?;
    let mut pdus = Vec::new();

    while !bytes.is_empty() {
        match MacPdu::take(&mut bytes) {
            Ok(pdu) => {
                if crc::check_crc(&pdu.mac_data) {
                    pdus.push(pdu);
                } else {
                    counters.crc_mismatch += 1;
                    warn!("Dropping PDU with failed CRC");
                }
            }
            Err(e) => {
                warn!("Malformed PDU stream from PHY: {:?}", e);
                break;
            }
        }
    }

    // The tail codec yields the last-serialized record first.
    pdus.reverse();
    Ok(pdus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        wire::{Allocation, MacPduCtl, McsConfig, MimoConfig},
        PeerId,
    };
    use alloc::{collections::VecDeque, vec};

    /// A loopback transport: messages sent come back on the same side.
    #[derive(Default)]
    struct Loopback {
        pdu_messages: VecDeque<Vec<u8>>,
    }

    impl Phy for Loopback {
        type Error = core::convert::Infallible;

        async fn send_pdu_message(&mut self, message: Vec<u8>) -> Result<(), Self::Error> {
            self.pdu_messages.push_back(message);
            Ok(())
        }

        async fn receive_pdu_message(&mut self) -> Result<Vec<u8>, Self::Error> {
            Ok(self.pdu_messages.pop_front().unwrap())
        }

        async fn send_control(&mut self, _message: Vec<u8>) -> Result<(), Self::Error> {
            unimplemented!()
        }

        async fn receive_control(&mut self) -> Result<Vec<u8>, Self::Error> {
            unimplemented!()
        }
    }

    fn pdu(seq: u8, payload: &[u8]) -> MacPdu {
        let mut pdu = MacPdu::new(
            0,
            MacPduCtl {
                sequence_number: seq,
                ..Default::default()
            },
            Allocation {
                target_peer: PeerId::from_nibble(1),
                first_rb: 0,
                number_of_rb: 66,
            },
            MimoConfig::default(),
            McsConfig::default(),
        );
        pdu.mac_data = payload.to_vec();
        pdu.mcs.num_info_bytes = payload.len();
        pdu
    }

    #[futures_test::test]
    async fn pdus_round_trip_in_order() {
        let mut phy = Loopback::default();
        let mut counters = DropCounters::default();

        send_pdus(&mut phy, vec![pdu(0, b"first"), pdu(1, b"second")])
            .await
            .unwrap();
        let received = receive_pdus(&mut phy, &mut counters).await.unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].ctl.sequence_number, 0);
        assert_eq!(received[1].ctl.sequence_number, 1);

        // The CRC trailer was stamped over the payload and accounted for.
        assert!(received[0].mac_data.starts_with(b"first"));
        assert_eq!(received[0].mac_data.len(), 7);
        assert_eq!(received[0].mcs.num_info_bytes, 7);
        assert_eq!(counters.crc_mismatch, 0);
    }

    #[futures_test::test]
    async fn corrupted_pdu_is_dropped() {
        let mut phy = Loopback::default();
        let mut counters = DropCounters::default();

        send_pdus(&mut phy, vec![pdu(0, b"keep me"), pdu(1, b"corrupt me")])
            .await
            .unwrap();

        // Flip a payload bit of the second PDU inside the queued message.
        let message = phy.pdu_messages.back_mut().unwrap();
        let position = message
            .windows(7)
            .position(|window| window == b"corrupt")
            .unwrap();
        message[position] ^= 0x01;

        let received = receive_pdus(&mut phy, &mut counters).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].ctl.sequence_number, 0);
        assert_eq!(counters.crc_mismatch, 1);
    }
}
