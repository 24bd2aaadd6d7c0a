//! Ethernet II frame view.

use crate::types::MacAddr;
use crate::{ETH_ADDR_LEN, ETH_HEADER_LEN};

// Field offsets within the Ethernet header.
const DST: usize = 0;
const SRC: usize = 6;
const ETHERTYPE: usize = 12;

/// Typed view over an Ethernet II frame.
///
/// Wraps any byte container; accessors are available for `AsRef<[u8]>` and
/// mutators additionally require `AsMut<[u8]>`.  [`parse`](Self::parse)
/// enforces the 14-byte structural minimum once, so accessors never index out
/// of bounds.
pub struct EthernetFrame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> EthernetFrame<T> {
    /// Wrap `buffer` as an Ethernet frame.
    ///
    /// Returns `None` if the buffer is shorter than the Ethernet header.
    pub fn parse(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < ETH_HEADER_LEN {
            return None;
        }
        Some(Self { buffer })
    }

    /// Wrap a buffer whose length the caller already guarantees.
    ///
    /// Used by builders writing into freshly sized frames; accessors panic on
    /// an undersized buffer.
    #[inline]
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Destination hardware address.
    #[inline]
    pub fn dst_addr(&self) -> MacAddr {
        let b = self.buffer.as_ref();
        let mut mac = [0u8; ETH_ADDR_LEN];
        mac.copy_from_slice(&b[DST..DST + ETH_ADDR_LEN]);
        MacAddr(mac)
    }

    /// Source hardware address.
    #[inline]
    pub fn src_addr(&self) -> MacAddr {
        let b = self.buffer.as_ref();
        let mut mac = [0u8; ETH_ADDR_LEN];
        mac.copy_from_slice(&b[SRC..SRC + ETH_ADDR_LEN]);
        MacAddr(mac)
    }

    /// Raw EtherType field value.
    #[inline]
    pub fn ethertype(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[ETHERTYPE], b[ETHERTYPE + 1]])
    }

    /// Bytes after the Ethernet header.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[ETH_HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EthernetFrame<T> {
    /// Set the destination hardware address.
    #[inline]
    pub fn set_dst_addr(&mut self, mac: MacAddr) {
        self.buffer.as_mut()[DST..DST + ETH_ADDR_LEN].copy_from_slice(&mac.0);
    }

    /// Set the source hardware address.
    #[inline]
    pub fn set_src_addr(&mut self, mac: MacAddr) {
        self.buffer.as_mut()[SRC..SRC + ETH_ADDR_LEN].copy_from_slice(&mac.0);
    }

    /// Set the EtherType field.
    #[inline]
    pub fn set_ethertype(&mut self, value: u16) {
        self.buffer.as_mut()[ETHERTYPE..ETHERTYPE + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Fill the whole header in one call.
    pub fn fill(&mut self, dst: MacAddr, src: MacAddr, ethertype: u16) {
        self.set_dst_addr(dst);
        self.set_src_addr(src);
        self.set_ethertype(ethertype);
    }

    /// Mutable bytes after the Ethernet header.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[ETH_HEADER_LEN..]
    }
}
