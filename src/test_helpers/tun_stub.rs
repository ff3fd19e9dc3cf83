//! An in-memory tunnel device.

use std::{convert::Infallible, sync::Arc, vec::Vec};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};

use crate::tun::TunDevice;

type PacketQueue = Channel<CriticalSectionRawMutex, Vec<u8>, 32>;

struct Queues {
    inbound: PacketQueue,
    outbound: PacketQueue,
}

/// The MAC-side endpoint handed to the engine.
pub struct MemTun {
    queues: Arc<Queues>,
}

/// The host-side endpoint held by the test.
pub struct TunHarness {
    queues: Arc<Queues>,
}

/// Create a connected tunnel pair.
pub fn mem_tun() -> (MemTun, TunHarness) {
    let queues = Arc::new(Queues {
        inbound: Channel::new(),
        outbound: Channel::new(),
    });
    (
        MemTun {
            queues: Arc::clone(&queues),
        },
        TunHarness { queues },
    )
}

impl TunDevice for MemTun {
    type Error = Infallible;

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(Some(self.queues.inbound.receive().await))
    }

    async fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        self.queues.outbound.send(packet.to_vec()).await;
        Ok(())
    }
}

impl TunHarness {
    /// Inject a packet as if the host routed it into the tunnel.
    pub async fn inject(&self, packet: Vec<u8>) {
        self.queues.inbound.send(packet).await;
    }

    /// The next packet the MAC delivered to the host stack.
    pub async fn next_delivered(&self) -> Vec<u8> {
        self.queues.outbound.receive().await
    }

    /// The next delivered packet, if one is already waiting.
    pub fn try_next_delivered(&self) -> Option<Vec<u8>> {
        self.queues.outbound.try_receive().ok()
    }

    /// Build a minimal IPv4 packet towards `destination`.
    pub fn ipv4_packet(destination: [u8; 4], payload_len: usize) -> Vec<u8> {
        let mut packet = vec![0u8; 20 + payload_len];
        packet[0] = 0x45;
        packet[16..20].copy_from_slice(&destination);
        packet
    }
}
