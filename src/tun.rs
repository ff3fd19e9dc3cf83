//! The seam to the OS tunnel device.
//!
//! A bidirectional byte stream of IPv4 packets. The real device is a Linux
//! TUN interface read with a short poll timeout; tests use an in-memory
//! stub. Packet filtering (IP version, broadcast, multicast) is not done
//! here but at enqueue time in the SDU buffers.

use alloc::vec::Vec;

/// Poll timeout of a tunnel read, in microseconds.
pub const TUN_TIMEOUT_US: u32 = 100;

pub trait TunDevice {
    #[cfg(not(feature = "defmt-03"))]
    type Error: core::error::Error;
    #[cfg(feature = "defmt-03")]
    type Error: core::error::Error + defmt::Format;

    /// Read one packet. Resolves to `None` when the poll timeout elapses
    /// without traffic. Must be cancel-safe.
    async fn receive(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Write one packet towards the host network stack.
    async fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error>;
}
