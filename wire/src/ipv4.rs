//! IPv4 header view (RFC 791).

use bitflags::bitflags;

use crate::checksum::internet_checksum;
use crate::types::Ipv4Addr;
use crate::{IPV4_HEADER_LEN, IPV4_VERSION};

// Field offsets within the IPv4 header.
const VER_IHL: usize = 0;
const TOS: usize = 1;
const TOTAL_LEN: usize = 2;
const IDENT: usize = 4;
const FLAGS_FRAG: usize = 6;
const TTL: usize = 8;
const PROTOCOL: usize = 9;
const CHECKSUM: usize = 10;
const SRC: usize = 12;
const DST: usize = 16;

bitflags! {
    /// IPv4 header control flags (the top three bits of the
    /// flags/fragment-offset word).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IpFlags: u8 {
        /// DF — do not fragment.
        const DONT_FRAGMENT = 0b010;
        /// MF — more fragments follow.
        const MORE_FRAGMENTS = 0b001;
    }
}

/// Typed view over an IPv4 header (and trailing payload bytes, if present).
///
/// [`parse`](Self::parse) enforces the 20-byte minimum, the version field,
/// and that the buffer covers the full IHL-declared header, so header
/// accessors never index out of bounds.
pub struct Ipv4Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Ipv4Packet<T> {
    /// Wrap `buffer` as an IPv4 datagram starting at the IP header.
    ///
    /// Returns `None` when the buffer is shorter than 20 bytes, the version
    /// is not 4, or the declared header length overruns the buffer.
    pub fn parse(buffer: T) -> Option<Self> {
        let b = buffer.as_ref();
        if b.len() < IPV4_HEADER_LEN {
            return None;
        }
        let ihl = ((b[VER_IHL] & 0x0F) as usize) * 4;
        if (b[VER_IHL] >> 4) != IPV4_VERSION || ihl < IPV4_HEADER_LEN || b.len() < ihl {
            return None;
        }
        Some(Self { buffer })
    }

    /// Wrap a buffer whose layout the caller already guarantees.
    #[inline]
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Header length in bytes (IHL × 4).
    #[inline]
    pub fn header_len(&self) -> usize {
        ((self.buffer.as_ref()[VER_IHL] & 0x0F) as usize) * 4
    }

    /// Total datagram length field (header + payload).
    #[inline]
    pub fn total_len(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[TOTAL_LEN], b[TOTAL_LEN + 1]])
    }

    /// Control flags.
    #[inline]
    pub fn flags(&self) -> IpFlags {
        let b = self.buffer.as_ref();
        let word = u16::from_be_bytes([b[FLAGS_FRAG], b[FLAGS_FRAG + 1]]);
        IpFlags::from_bits_truncate((word >> 13) as u8)
    }

    /// Time to live.
    #[inline]
    pub fn ttl(&self) -> u8 {
        self.buffer.as_ref()[TTL]
    }

    /// Upper-layer protocol number.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.buffer.as_ref()[PROTOCOL]
    }

    /// Header checksum field value.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[CHECKSUM], b[CHECKSUM + 1]])
    }

    /// Source address.
    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        let b = self.buffer.as_ref();
        Ipv4Addr([b[SRC], b[SRC + 1], b[SRC + 2], b[SRC + 3]])
    }

    /// Destination address.
    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        let b = self.buffer.as_ref();
        Ipv4Addr([b[DST], b[DST + 1], b[DST + 2], b[DST + 3]])
    }

    /// The header bytes (IHL × 4 of them).
    #[inline]
    pub fn header(&self) -> &[u8] {
        &self.buffer.as_ref()[..self.header_len()]
    }

    /// Bytes after the header.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[self.header_len()..]
    }

    /// `true` if the header checksum verifies as received.
    pub fn verify_checksum(&self) -> bool {
        internet_checksum(self.header()) == 0
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Ipv4Packet<T> {
    /// Set the version and header-length byte (`ihl` counted in bytes).
    #[inline]
    pub fn set_version_and_len(&mut self, header_len: usize) {
        self.buffer.as_mut()[VER_IHL] = (IPV4_VERSION << 4) | ((header_len / 4) as u8 & 0x0F);
    }

    /// Set the type-of-service byte.
    #[inline]
    pub fn set_tos(&mut self, tos: u8) {
        self.buffer.as_mut()[TOS] = tos;
    }

    /// Set the total-length field.
    #[inline]
    pub fn set_total_len(&mut self, len: u16) {
        self.buffer.as_mut()[TOTAL_LEN..TOTAL_LEN + 2].copy_from_slice(&len.to_be_bytes());
    }

    /// Set the identification field.
    #[inline]
    pub fn set_ident(&mut self, ident: u16) {
        self.buffer.as_mut()[IDENT..IDENT + 2].copy_from_slice(&ident.to_be_bytes());
    }

    /// Set the control flags, zeroing the fragment offset.
    #[inline]
    pub fn set_flags(&mut self, flags: IpFlags) {
        let word = (flags.bits() as u16) << 13;
        self.buffer.as_mut()[FLAGS_FRAG..FLAGS_FRAG + 2].copy_from_slice(&word.to_be_bytes());
    }

    /// Set the time to live.
    #[inline]
    pub fn set_ttl(&mut self, ttl: u8) {
        self.buffer.as_mut()[TTL] = ttl;
    }

    /// Set the upper-layer protocol number.
    #[inline]
    pub fn set_protocol(&mut self, protocol: u8) {
        self.buffer.as_mut()[PROTOCOL] = protocol;
    }

    /// Set the source address.
    #[inline]
    pub fn set_src_addr(&mut self, ip: Ipv4Addr) {
        self.buffer.as_mut()[SRC..SRC + 4].copy_from_slice(&ip.0);
    }

    /// Set the destination address.
    #[inline]
    pub fn set_dst_addr(&mut self, ip: Ipv4Addr) {
        self.buffer.as_mut()[DST..DST + 4].copy_from_slice(&ip.0);
    }

    /// Zero the checksum slot, recompute over the header, and store the
    /// result.
    pub fn fill_checksum(&mut self) {
        let header_len = self.header_len();
        let b = self.buffer.as_mut();
        b[CHECKSUM..CHECKSUM + 2].copy_from_slice(&[0, 0]);
        let sum = internet_checksum(&b[..header_len]);
        b[CHECKSUM..CHECKSUM + 2].copy_from_slice(&sum.to_be_bytes());
    }
}
