//! Per-peer SDU queues feeding the scheduler.
//!
//! The tunnel reader enqueues data SDUs (MACD), the protocol control
//! enqueues control SDUs (MACC); only the scheduler dequeues. Data SDUs
//! expire after the configured number of subframes; control SDUs never
//! expire. All access is serialized by the engine's event loop.

use alloc::{collections::VecDeque, vec::Vec};

use crate::{resolver::IpPeerTable, PeerId};

/// Offset of the destination address inside an IPv4 header.
const DST_OFFSET: usize = 16;

/// Why an SDU was refused at enqueue. Each reason has a counter in
/// [`DropCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum EnqueueError {
    /// Too short to carry an IPv4 header.
    Runt,
    /// The IP version nibble is not 4.
    NotIpv4,
    /// Destination 255.255.255.255.
    Broadcast,
    /// Destination in 224.0.0.0/4.
    Multicast,
    /// The destination address is not in the peer table.
    PeerUnknown,
}

/// Counters for every recoverable drop in the system.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropCounters {
    pub runt: u64,
    pub not_ipv4: u64,
    pub broadcast: u64,
    pub multicast: u64,
    pub peer_unknown: u64,
    pub ip_timeout: u64,
    pub crc_mismatch: u64,
}

#[derive(Debug)]
struct SduEntry {
    bytes: Vec<u8>,
    enqueued_at: u64,
}

#[derive(Debug, Default)]
struct PeerBuffer {
    data: VecDeque<SduEntry>,
    control: VecDeque<SduEntry>,
}

/// All SDU queues of the MAC, one buffer pair per peer, in peer-table
/// insertion order.
#[derive(Debug)]
pub struct SduBuffers {
    peers: Vec<(PeerId, PeerBuffer)>,
    pub counters: DropCounters,
}

impl SduBuffers {
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            peers: peers
                .into_iter()
                .map(|peer| (peer, PeerBuffer::default()))
                .collect(),
            counters: DropCounters::default(),
        }
    }

    fn buffer(&self, peer: PeerId) -> Option<&PeerBuffer> {
        self.peers
            .iter()
            .find(|(id, _)| *id == peer)
            .map(|(_, buffer)| buffer)
    }

    fn buffer_mut(&mut self, peer: PeerId) -> Option<&mut PeerBuffer> {
        self.peers
            .iter_mut()
            .find(|(id, _)| *id == peer)
            .map(|(_, buffer)| buffer)
    }

    /// Enqueue one packet read from the tunnel. The destination peer is
    /// resolved from the IPv4 destination address; malformed, broadcast,
    /// multicast and unroutable packets are counted and refused.
    pub fn enqueue_data(
        &mut self,
        packet: &[u8],
        resolver: &IpPeerTable,
        now: u64,
    ) -> Result<PeerId, EnqueueError> {
        if packet.len() < DST_OFFSET + 4 {
            self.counters.runt += 1;
            return Err(EnqueueError::Runt);
        }
        if packet[0] >> 4 != 4 {
            self.counters.not_ipv4 += 1;
            return Err(EnqueueError::NotIpv4);
        }

        let destination = [
            packet[DST_OFFSET],
            packet[DST_OFFSET + 1],
            packet[DST_OFFSET + 2],
            packet[DST_OFFSET + 3],
        ];
        if destination == [255, 255, 255, 255] {
            self.counters.broadcast += 1;
            return Err(EnqueueError::Broadcast);
        }
        if (224..=239).contains(&destination[0]) {
            self.counters.multicast += 1;
            return Err(EnqueueError::Multicast);
        }

        let Some(peer) = resolver.resolve(destination) else {
            self.counters.peer_unknown += 1;
            return Err(EnqueueError::PeerUnknown);
        };
        let Some(buffer) = self.buffer_mut(peer) else {
            self.counters.peer_unknown += 1;
            return Err(EnqueueError::PeerUnknown);
        };

        buffer.data.push_back(SduEntry {
            bytes: packet.to_vec(),
            enqueued_at: now,
        });

        Ok(peer)
    }

    /// Enqueue a control SDU for `peer` unconditionally.
    pub fn enqueue_control(&mut self, sdu: Vec<u8>, peer: PeerId, now: u64) -> bool {
        match self.buffer_mut(peer) {
            Some(buffer) => {
                buffer.control.push_back(SduEntry {
                    bytes: sdu,
                    enqueued_at: now,
                });
                true
            }
            None => {
                self.counters.peer_unknown += 1;
                false
            }
        }
    }

    pub fn next_data_size(&self, peer: PeerId) -> Option<usize> {
        self.buffer(peer)?.data.front().map(|sdu| sdu.bytes.len())
    }

    pub fn next_data(&mut self, peer: PeerId) -> Option<Vec<u8>> {
        self.buffer_mut(peer)?.data.pop_front().map(|sdu| sdu.bytes)
    }

    pub fn next_control_size(&self, peer: PeerId) -> Option<usize> {
        self.buffer(peer)?
            .control
            .front()
            .map(|sdu| sdu.bytes.len())
    }

    pub fn next_control(&mut self, peer: PeerId) -> Option<Vec<u8>> {
        self.buffer_mut(peer)?
            .control
            .pop_front()
            .map(|sdu| sdu.bytes)
    }

    /// Buffer status information for one peer: is anything pending?
    pub fn buffer_status_information(&self, peer: PeerId) -> bool {
        self.buffer(peer)
            .is_some_and(|buffer| !buffer.data.is_empty() || !buffer.control.is_empty())
    }

    /// Buffer status information over all peers.
    pub fn any_pending(&self) -> bool {
        self.peers
            .iter()
            .any(|(peer, _)| self.buffer_status_information(*peer))
    }

    /// Peers with pending SDUs and their total pending bytes, in peer-table
    /// insertion order. This is what the scheduler selects from.
    pub fn bsi_snapshot(&self) -> Vec<(PeerId, usize)> {
        self.peers
            .iter()
            .filter_map(|(peer, buffer)| {
                let pending = buffer.data.iter().map(|sdu| sdu.bytes.len()).sum::<usize>()
                    + buffer
                        .control
                        .iter()
                        .map(|sdu| sdu.bytes.len())
                        .sum::<usize>();
                (pending > 0).then_some((*peer, pending))
            })
            .collect()
    }

    /// Evict every data SDU that has reached `ip_timeout` subframes of
    /// age: an SDU enqueued at tick `t` survives through `t + ip_timeout
    /// - 1` and is gone from `t + ip_timeout` onward. Control SDUs are
    /// exempt. Returns the number of dropped SDUs.
    pub fn timeout_sweep(&mut self, now: u64, ip_timeout: u64) -> usize {
        let mut dropped = 0;
        for (_, buffer) in self.peers.iter_mut() {
            while let Some(front) = buffer.data.front() {
                if now.saturating_sub(front.enqueued_at) >= ip_timeout {
                    buffer.data.pop_front();
                    dropped += 1;
                } else {
                    // Entries behind the front are younger.
                    break;
                }
            }
        }
        self.counters.ip_timeout += dropped as u64;
        dropped as usize
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn ipv4_packet(destination: [u8; 4]) -> Vec<u8> {
        let mut packet = vec![0u8; 28];
        packet[0] = 0x45;
        packet[DST_OFFSET..DST_OFFSET + 4].copy_from_slice(&destination);
        packet
    }

    fn setup() -> (SduBuffers, IpPeerTable) {
        let buffers = SduBuffers::new([PeerId::from_nibble(1), PeerId::from_nibble(2)]);
        let resolver = IpPeerTable::with_defaults(2);
        (buffers, resolver)
    }

    #[test]
    fn routes_by_destination_address() {
        let (mut buffers, resolver) = setup();

        let peer = buffers
            .enqueue_data(&ipv4_packet([10, 0, 0, 11]), &resolver, 0)
            .unwrap();
        assert_eq!(peer, PeerId::from_nibble(1));
        assert!(buffers.buffer_status_information(peer));
        assert!(!buffers.buffer_status_information(PeerId::from_nibble(2)));
        assert_eq!(buffers.next_data_size(peer), Some(28));
    }

    #[test]
    fn drop_rules() {
        let (mut buffers, resolver) = setup();

        let mut not_ip = ipv4_packet([10, 0, 0, 11]);
        not_ip[0] = 0x60;
        assert_eq!(
            buffers.enqueue_data(&not_ip, &resolver, 0),
            Err(EnqueueError::NotIpv4)
        );
        assert_eq!(
            buffers.enqueue_data(&ipv4_packet([255, 255, 255, 255]), &resolver, 0),
            Err(EnqueueError::Broadcast)
        );
        assert_eq!(
            buffers.enqueue_data(&ipv4_packet([224, 0, 0, 1]), &resolver, 0),
            Err(EnqueueError::Multicast)
        );
        assert_eq!(
            buffers.enqueue_data(&ipv4_packet([239, 255, 0, 1]), &resolver, 0),
            Err(EnqueueError::Multicast)
        );
        assert_eq!(
            buffers.enqueue_data(&ipv4_packet([10, 0, 0, 99]), &resolver, 0),
            Err(EnqueueError::PeerUnknown)
        );
        assert_eq!(
            buffers.enqueue_data(&[0x45, 0, 0], &resolver, 0),
            Err(EnqueueError::Runt)
        );

        // Edge of the multicast range is still unicast.
        assert!(buffers
            .enqueue_data(&ipv4_packet([10, 0, 0, 12]), &resolver, 0)
            .is_ok());

        assert!(!buffers.buffer_status_information(PeerId::from_nibble(1)));
        assert_eq!(buffers.counters.not_ipv4, 1);
        assert_eq!(buffers.counters.broadcast, 1);
        assert_eq!(buffers.counters.multicast, 2);
        assert_eq!(buffers.counters.peer_unknown, 1);
        assert_eq!(buffers.counters.runt, 1);
    }

    #[test]
    fn fifo_order_per_class() {
        let (mut buffers, resolver) = setup();
        let peer = PeerId::from_nibble(1);

        let mut first = ipv4_packet([10, 0, 0, 11]);
        first[1] = 1;
        let mut second = ipv4_packet([10, 0, 0, 11]);
        second[1] = 2;

        buffers.enqueue_data(&first, &resolver, 0).unwrap();
        buffers.enqueue_data(&second, &resolver, 0).unwrap();
        buffers.enqueue_control(vec![b'1'], peer, 0);

        assert_eq!(buffers.next_control(peer), Some(vec![b'1']));
        assert_eq!(buffers.next_data(peer), Some(first));
        assert_eq!(buffers.next_data(peer), Some(second));
        assert_eq!(buffers.next_data(peer), None);
    }

    #[test]
    fn timeout_evicts_only_old_data() {
        let (mut buffers, resolver) = setup();
        let peer = PeerId::from_nibble(1);
        let ip_timeout = 5;

        buffers
            .enqueue_data(&ipv4_packet([10, 0, 0, 11]), &resolver, 0)
            .unwrap();
        buffers.enqueue_control(vec![b'1'], peer, 0);
        buffers
            .enqueue_data(&ipv4_packet([10, 0, 0, 11]), &resolver, 4)
            .unwrap();

        // Present through tick enqueued + timeout - 1.
        assert_eq!(buffers.timeout_sweep(4, ip_timeout), 0);
        // At tick enqueued + timeout the first entry ages out.
        assert_eq!(buffers.timeout_sweep(5, ip_timeout), 1);
        // The younger data SDU and the control SDU survive indefinitely.
        assert_eq!(buffers.timeout_sweep(1000, ip_timeout), 1);
        assert_eq!(buffers.next_control_size(peer), Some(1));
        assert_eq!(buffers.counters.ip_timeout, 2);
        assert!(!buffers.buffer_status_information(peer) || buffers.next_data_size(peer).is_none());
    }

    #[test]
    fn bsi_snapshot_totals_bytes() {
        let (mut buffers, resolver) = setup();

        buffers
            .enqueue_data(&ipv4_packet([10, 0, 0, 12]), &resolver, 0)
            .unwrap();
        buffers.enqueue_control(vec![0; 10], PeerId::from_nibble(2), 0);

        let snapshot = buffers.bsi_snapshot();
        assert_eq!(snapshot, vec![(PeerId::from_nibble(2), 38)]);
        assert!(buffers.any_pending());
    }
}
