//! ICMP message view and error-datagram builder (RFC 792).

use crate::checksum::internet_checksum;
use crate::ethernet::EthernetFrame;
use crate::ipv4::{IpFlags, Ipv4Packet};
use crate::types::{IpProtocol, Ipv4Addr, MacAddr};
use crate::{
    ETH_HEADER_LEN, ETHERTYPE_IPV4, ICMP_ERROR_PAYLOAD_LEN, ICMP_FULL_HEADER_LEN, ICMP_HEADER_LEN,
    ICMP_TYPE_ECHO_REPLY, IPV4_HEADER_LEN,
};

// Field offsets within the ICMP message.
const TYPE: usize = 0;
const CODE: usize = 1;
const CHECKSUM: usize = 2;
const ECHO_IDENT: usize = 4;
const ECHO_SEQ: usize = 6;

/// TTL used on ICMP datagrams the router originates.
const ICMP_TTL: u8 = 64;

/// Typed view over an ICMP message (header plus payload).
///
/// The wrapped buffer must cover the whole message: the checksum is defined
/// over every byte of it.
pub struct IcmpPacket<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> IcmpPacket<T> {
    /// Wrap `buffer` as an ICMP message.
    ///
    /// Returns `None` if the buffer is shorter than the 4-byte type/code/
    /// checksum prefix.
    pub fn parse(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < ICMP_HEADER_LEN {
            return None;
        }
        Some(Self { buffer })
    }

    /// Wrap a buffer whose length the caller already guarantees.
    #[inline]
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Message type.
    #[inline]
    pub fn icmp_type(&self) -> u8 {
        self.buffer.as_ref()[TYPE]
    }

    /// Message code.
    #[inline]
    pub fn code(&self) -> u8 {
        self.buffer.as_ref()[CODE]
    }

    /// Checksum field value.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[CHECKSUM], b[CHECKSUM + 1]])
    }

    /// Echo identifier.  Only meaningful on echo messages, which carry at
    /// least the 8-byte header.
    #[inline]
    pub fn echo_ident(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[ECHO_IDENT], b[ECHO_IDENT + 1]])
    }

    /// Echo sequence number.  Only meaningful on echo messages.
    #[inline]
    pub fn echo_seq(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[ECHO_SEQ], b[ECHO_SEQ + 1]])
    }

    /// `true` if the checksum over the whole message verifies as received.
    pub fn verify_checksum(&self) -> bool {
        internet_checksum(self.buffer.as_ref()) == 0
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> IcmpPacket<T> {
    /// Set the message type.
    #[inline]
    pub fn set_icmp_type(&mut self, value: u8) {
        self.buffer.as_mut()[TYPE] = value;
    }

    /// Set the message code.
    #[inline]
    pub fn set_code(&mut self, value: u8) {
        self.buffer.as_mut()[CODE] = value;
    }

    /// Zero the checksum slot, recompute over the whole message, and store
    /// the result.
    pub fn fill_checksum(&mut self) {
        let b = self.buffer.as_mut();
        b[CHECKSUM..CHECKSUM + 2].copy_from_slice(&[0, 0]);
        let sum = internet_checksum(b);
        b[CHECKSUM..CHECKSUM + 2].copy_from_slice(&sum.to_be_bytes());
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Rewrite an ICMP echo request into the matching reply, in place.
///
/// `icmp` covers the whole message (header plus echoed payload).  Sets the
/// type and code to 0 and refreshes the checksum; identifier, sequence, and
/// payload pass through untouched.
pub fn rewrite_into_echo_reply(icmp: &mut [u8]) {
    if icmp.len() < ICMP_HEADER_LEN {
        return;
    }
    let mut view = IcmpPacket::new_unchecked(icmp);
    view.set_icmp_type(ICMP_TYPE_ECHO_REPLY);
    view.set_code(0);
    view.fill_checksum();
}

/// Build a complete ICMP error frame (destination unreachable or time
/// exceeded) quoting the offending datagram.
///
/// `offending` is the offending IPv4 datagram starting at its IP header; the
/// error carries that header plus the first 8 payload bytes, per RFC 792.
/// The rest-of-header word is zeroed (no next-hop MTU).
pub fn build_error(
    eth_src: MacAddr,
    eth_dst: MacAddr,
    ip_src: Ipv4Addr,
    ip_dst: Ipv4Addr,
    icmp_type: u8,
    icmp_code: u8,
    offending: &[u8],
) -> Vec<u8> {
    let quoted_hdr = match Ipv4Packet::parse(offending) {
        Some(ip) => ip.header_len(),
        None => IPV4_HEADER_LEN,
    };
    let quoted_len = offending.len().min(quoted_hdr + ICMP_ERROR_PAYLOAD_LEN);

    let icmp_len = ICMP_FULL_HEADER_LEN + quoted_len;
    let total_len = IPV4_HEADER_LEN + icmp_len;
    let mut frame = vec![0u8; ETH_HEADER_LEN + total_len];

    let mut eth = EthernetFrame::new_unchecked(&mut frame[..]);
    eth.fill(eth_dst, eth_src, ETHERTYPE_IPV4);

    let mut ip = Ipv4Packet::new_unchecked(&mut frame[ETH_HEADER_LEN..]);
    ip.set_version_and_len(IPV4_HEADER_LEN);
    ip.set_tos(0);
    ip.set_total_len(total_len as u16);
    ip.set_ident(0);
    ip.set_flags(IpFlags::DONT_FRAGMENT);
    ip.set_ttl(ICMP_TTL);
    ip.set_protocol(IpProtocol::Icmp.as_u8());
    ip.set_src_addr(ip_src);
    ip.set_dst_addr(ip_dst);
    ip.fill_checksum();

    let icmp_start = ETH_HEADER_LEN + IPV4_HEADER_LEN;
    let icmp = &mut frame[icmp_start..];
    icmp[TYPE] = icmp_type;
    icmp[CODE] = icmp_code;
    // Bytes 2..8 (checksum + unused rest-of-header) stay zero until the final
    // checksum pass.
    icmp[ICMP_FULL_HEADER_LEN..].copy_from_slice(&offending[..quoted_len]);
    IcmpPacket::new_unchecked(icmp).fill_checksum();

    frame
}
