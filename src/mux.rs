//! Aggregation of SDUs into a MAC PDU body and the inverse unpacking.
//!
//! PDU body layout:
//!
//! ```text
//! byte 0            high nibble source peer, low nibble destination peer
//! byte 1            number of SDUs N (1..=255)
//! bytes 2..2+2N     per SDU: MSB = data/control flag (1 = data),
//!                   remaining 15 bits = SDU size, big-endian
//! rest              SDU payloads, concatenated in header order
//! ```
//!
//! Control SDUs always precede data SDUs: a control SDU inserts at the
//! running control offset, a data SDU appends at the tail. The CRC trailer
//! is not part of the body; the L1 interface stamps it, but the 4-byte
//! budget (2 header bytes + 2 CRC bytes) is accounted for here.

use alloc::vec::Vec;

use crate::{PeerId, TrafficClass};

/// Fixed overhead of a PDU: source/destination byte, SDU count byte and
/// the CRC trailer stamped later.
const PDU_OVERHEAD: usize = 4;

/// Per-SDU overhead: the flag + size header pair.
const SDU_OVERHEAD: usize = 2;

/// The largest SDU size the 15-bit size field can carry.
const MAX_SDU_SIZE: usize = (1 << 15) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MuxError {
    /// Adding the SDU would exceed the byte budget of the PDU.
    CapacityExceeded,
    /// The header only has one byte for the SDU count.
    TooManySdus,
    /// An SDU larger than the 15-bit size field can describe.
    SduTooLarge,
}

impl core::fmt::Display for MuxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MuxError::CapacityExceeded => write!(f, "PDU byte budget exceeded"),
            MuxError::TooManySdus => write!(f, "more than 255 SDUs in one PDU"),
            MuxError::SduTooLarge => write!(f, "SDU exceeds 15-bit size field"),
        }
    }
}

impl core::error::Error for MuxError {}

/// Builds one PDU body out of SDUs under a byte budget.
pub struct Multiplexer {
    max_body_bytes: usize,
    source: PeerId,
    destination: PeerId,
    sdus: Vec<(TrafficClass, Vec<u8>)>,
    /// Index where the next control SDU is inserted, so that all control
    /// SDUs stay in front of all data SDUs.
    control_offset: usize,
    current_bytes: usize,
}

impl Multiplexer {
    pub fn new(max_body_bytes: usize, source: PeerId, destination: PeerId) -> Self {
        Self {
            max_body_bytes,
            source,
            destination,
            sdus: Vec::new(),
            control_offset: 0,
            current_bytes: PDU_OVERHEAD,
        }
    }

    /// Bytes the PDU will occupy with everything added so far, CRC trailer
    /// included.
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.sdus.is_empty()
    }

    pub fn num_sdus(&self) -> usize {
        self.sdus.len()
    }

    /// True when an SDU of `size` bytes would still fit.
    pub fn fits(&self, size: usize) -> bool {
        self.current_bytes + SDU_OVERHEAD + size <= self.max_body_bytes
    }

    /// Add one SDU. Control SDUs take the position after the previously
    /// added control SDUs; data SDUs go to the back.
    pub fn add_sdu(&mut self, sdu: Vec<u8>, class: TrafficClass) -> Result<(), MuxError> {
        if sdu.len() > MAX_SDU_SIZE {
            return Err(MuxError::SduTooLarge);
        }
        if !self.fits(sdu.len()) {
            return Err(MuxError::CapacityExceeded);
        }
        if self.sdus.len() == u8::MAX as usize {
            return Err(MuxError::TooManySdus);
        }

        self.current_bytes += SDU_OVERHEAD + sdu.len();
        match class {
            TrafficClass::Control => {
                self.sdus.insert(self.control_offset, (class, sdu));
                self.control_offset += 1;
            }
            TrafficClass::Data => self.sdus.push((class, sdu)),
        }

        Ok(())
    }

    /// Emit the MAC header followed by the payloads. The caller owns
    /// appending the CRC trailer.
    pub fn build_pdu(&self, out: &mut Vec<u8>) {
        out.reserve(self.current_bytes - 2);
        out.push((self.source.value() << 4) | (self.destination.value() & 15));
        out.push(self.sdus.len() as u8);

        for (class, sdu) in &self.sdus {
            out.push((class.flag_bit() << 7) | (sdu.len() >> 8) as u8);
            out.push((sdu.len() & 0xFF) as u8);
        }
        for (_, sdu) in &self.sdus {
            out.extend_from_slice(sdu);
        }
    }
}

/// A parsed PDU body, ready for SDU iteration.
pub struct Demultiplexer<'a> {
    source: PeerId,
    destination: PeerId,
    headers: Vec<(TrafficClass, usize)>,
    payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DemuxError {
    /// The body ends inside the header or inside a payload.
    Truncated,
}

impl core::fmt::Display for DemuxError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PDU body shorter than its header describes")
    }
}

impl core::error::Error for DemuxError {}

impl<'a> Demultiplexer<'a> {
    pub fn parse(body: &'a [u8]) -> Result<Self, DemuxError> {
        let [addresses, count, rest @ ..] = body else {
            return Err(DemuxError::Truncated);
        };

        let count = *count as usize;
        if rest.len() < count * SDU_OVERHEAD {
            return Err(DemuxError::Truncated);
        }

        let mut headers = Vec::with_capacity(count);
        let mut total = 0usize;
        for pair in rest[..count * SDU_OVERHEAD].chunks_exact(SDU_OVERHEAD) {
            let class = TrafficClass::from_flag_bit(pair[0] >> 7);
            let size = (((pair[0] & 0x7F) as usize) << 8) | pair[1] as usize;
            headers.push((class, size));
            total += size;
        }

        let payload = &rest[count * SDU_OVERHEAD..];
        if payload.len() < total {
            return Err(DemuxError::Truncated);
        }

        Ok(Self {
            source: PeerId::from_nibble(addresses >> 4),
            destination: PeerId::from_nibble(addresses & 15),
            headers,
            payload,
        })
    }

    pub fn source(&self) -> PeerId {
        self.source
    }

    pub fn destination(&self) -> PeerId {
        self.destination
    }

    pub fn num_sdus(&self) -> usize {
        self.headers.len()
    }

    /// Iterate the SDUs in header order.
    pub fn sdus(&self) -> impl Iterator<Item = (TrafficClass, &'a [u8])> + '_ {
        let payload = self.payload;
        let mut offset = 0;
        self.headers.iter().map(move |&(class, size)| {
            let sdu = &payload[offset..offset + size];
            offset += size;
            (class, sdu)
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn peers() -> (PeerId, PeerId) {
        (PeerId::BASE_STATION, PeerId::from_nibble(2))
    }

    #[test]
    fn round_trip_orders_control_first() {
        let (source, destination) = peers();
        let mut mux = Multiplexer::new(1000, source, destination);

        mux.add_sdu(vec![1, 1, 1], TrafficClass::Data).unwrap();
        mux.add_sdu(vec![2, 2], TrafficClass::Control).unwrap();
        mux.add_sdu(vec![3], TrafficClass::Data).unwrap();
        mux.add_sdu(vec![4, 4, 4, 4], TrafficClass::Control).unwrap();

        let mut body = Vec::new();
        mux.build_pdu(&mut body);

        let demux = Demultiplexer::parse(&body).unwrap();
        assert_eq!(demux.source(), source);
        assert_eq!(demux.destination(), destination);

        let sdus: Vec<_> = demux.sdus().collect();
        assert_eq!(
            sdus,
            [
                (TrafficClass::Control, &[2u8, 2][..]),
                (TrafficClass::Control, &[4, 4, 4, 4][..]),
                (TrafficClass::Data, &[1, 1, 1][..]),
                (TrafficClass::Data, &[3][..]),
            ]
        );
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let mut mux = Multiplexer::new(1000, PeerId::from_nibble(5), PeerId::from_nibble(9));
        mux.add_sdu(vec![0xAA; 300], TrafficClass::Data).unwrap();
        mux.add_sdu(vec![0xBB; 2], TrafficClass::Control).unwrap();

        let mut body = Vec::new();
        mux.build_pdu(&mut body);

        assert_eq!(body[0], 0x59);
        assert_eq!(body[1], 2);
        // Control SDU first: flag 0, size 2.
        assert_eq!(&body[2..4], &[0x00, 0x02]);
        // Data SDU: flag 1, size 300 = 0x012C.
        assert_eq!(&body[4..6], &[0x81, 0x2C]);
        assert_eq!(&body[6..8], &[0xBB, 0xBB]);
        assert_eq!(body[8..], vec![0xAA; 300]);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let (source, destination) = peers();
        let budget = 64;
        let mut mux = Multiplexer::new(budget, source, destination);

        let mut added = 0;
        loop {
            match mux.add_sdu(vec![0; 10], TrafficClass::Data) {
                Ok(()) => {
                    added += 1;
                    assert!(mux.current_bytes() <= budget);
                }
                Err(MuxError::CapacityExceeded) => break,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        // 4 + 5 * 12 = 64; a sixth SDU would need 76.
        assert_eq!(added, 5);
        assert_eq!(mux.current_bytes(), 64);
    }

    #[test]
    fn empty_and_oversize_sdus() {
        let (source, destination) = peers();
        let mut mux = Multiplexer::new(100_000, source, destination);
        assert!(mux.is_empty());

        assert_eq!(
            mux.add_sdu(vec![0; MAX_SDU_SIZE + 1], TrafficClass::Data),
            Err(MuxError::SduTooLarge)
        );
        assert!(mux.is_empty());

        mux.add_sdu(vec![7], TrafficClass::Data).unwrap();
        assert!(!mux.is_empty());
    }

    #[test]
    fn truncated_bodies_are_rejected() {
        assert!(Demultiplexer::parse(&[]).is_err());
        assert!(Demultiplexer::parse(&[0x12]).is_err());
        // Claims one SDU of 5 bytes but carries none.
        assert!(Demultiplexer::parse(&[0x12, 1, 0x80, 5]).is_err());
    }
}
