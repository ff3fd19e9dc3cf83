//! A four-channel in-memory PHY.

use std::{convert::Infallible, sync::Arc, vec::Vec};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

use crate::{
    crc,
    phy::{Phy, MESSAGE_QUEUE_DEPTH},
    serdes::Serdes,
    wire::MacPdu,
};

type MessageQueue = Channel<CriticalSectionRawMutex, Vec<u8>, MESSAGE_QUEUE_DEPTH>;

struct Queues {
    pdu_to_phy: MessageQueue,
    pdu_from_phy: MessageQueue,
    control_to_phy: MessageQueue,
    control_from_phy: MessageQueue,
}

impl Queues {
    fn new() -> Self {
        Self {
            pdu_to_phy: Channel::new(),
            pdu_from_phy: Channel::new(),
            control_to_phy: Channel::new(),
            control_from_phy: Channel::new(),
        }
    }
}

/// The MAC-side endpoint handed to the engine.
pub struct StubPhy {
    queues: Arc<Queues>,
}

/// The PHY-side endpoint held by the test.
pub struct PhyHarness {
    queues: Arc<Queues>,
}

/// Create a connected transceiver pair.
pub fn stub_phy() -> (StubPhy, PhyHarness) {
    let queues = Arc::new(Queues::new());
    (
        StubPhy {
            queues: Arc::clone(&queues),
        },
        PhyHarness { queues },
    )
}

impl Phy for StubPhy {
    type Error = Infallible;

    async fn send_pdu_message(&mut self, message: Vec<u8>) -> Result<(), Self::Error> {
        self.queues.pdu_to_phy.send(message).await;
        Ok(())
    }

    async fn receive_pdu_message(&mut self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.queues.pdu_from_phy.receive().await)
    }

    async fn send_control(&mut self, message: Vec<u8>) -> Result<(), Self::Error> {
        self.queues.control_to_phy.send(message).await;
        Ok(())
    }

    async fn receive_control(&mut self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.queues.control_from_phy.receive().await)
    }
}

impl PhyHarness {
    /// Deliver a control message to the MAC.
    pub async fn control_to_mac(&self, message: Vec<u8>) {
        self.queues.control_from_phy.send(message).await;
    }

    /// Deliver PDUs to the MAC the way a peer's L1 interface would: CRC
    /// stamped, all PDUs serialized into one message.
    pub async fn pdus_to_mac(&self, pdus: Vec<MacPdu>) {
        let mut message = Vec::new();
        for mut pdu in pdus {
            crc::append_crc(&mut pdu.mac_data);
            pdu.mcs.num_info_bytes += 2;
            pdu.append(&mut message);
        }
        self.queues.pdu_from_phy.send(message).await;
    }

    /// The next control message the MAC sent.
    pub async fn next_control_from_mac(&self) -> Vec<u8> {
        self.queues.control_to_phy.receive().await
    }

    /// The next control message, if one is already waiting.
    pub fn try_next_control_from_mac(&self) -> Option<Vec<u8>> {
        self.queues.control_to_phy.try_receive().ok()
    }

    /// The PDUs of the next transmitted subframe, CRC checked and in
    /// transmission order.
    pub async fn next_pdus_from_mac(&self) -> Vec<MacPdu> {
        let mut bytes = self.queues.pdu_to_phy.receive().await;

        let mut pdus = Vec::new();
        while !bytes.is_empty() {
            let pdu = MacPdu::take(&mut bytes).expect("valid PDU stream");
            assert!(crc::check_crc(&pdu.mac_data), "PDU failed its CRC");
            pdus.push(pdu);
        }
        pdus.reverse();
        pdus
    }

    /// Ask the MAC to schedule the next subframe.
    pub async fn trigger_tx(&self) {
        self.control_to_mac(vec![crate::wire::messages::opcode::TX_INDICATION])
            .await;
    }
}
