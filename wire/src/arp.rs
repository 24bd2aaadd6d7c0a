//! ARP packet view and frame builders (RFC 826, Ethernet/IPv4 only).

use crate::ethernet::EthernetFrame;
use crate::types::{Ipv4Addr, MacAddr};
use crate::{
    ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET, ARP_OPER_REPLY, ARP_OPER_REQUEST, ARP_PACKET_LEN,
    ARP_PLEN_IPV4, ARP_PTYPE_IPV4, ETH_ADDR_LEN, ETH_HEADER_LEN, ETHERTYPE_ARP,
};

// Field offsets within the ARP body.
const HTYPE: usize = 0;
const PTYPE: usize = 2;
const HLEN: usize = 4;
const PLEN: usize = 5;
const OPER: usize = 6;
const SHA: usize = 8;
const SPA: usize = 14;
const THA: usize = 18;
const TPA: usize = 24;

/// Typed view over an ARP packet body (the bytes after the Ethernet header).
pub struct ArpPacket<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> ArpPacket<T> {
    /// Wrap `buffer` as an ARP packet.
    ///
    /// Returns `None` if the buffer is shorter than the 28-byte Ethernet/IPv4
    /// ARP body.
    pub fn parse(buffer: T) -> Option<Self> {
        if buffer.as_ref().len() < ARP_PACKET_LEN {
            return None;
        }
        Some(Self { buffer })
    }

    /// Wrap a buffer whose length the caller already guarantees.
    #[inline]
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// `true` if the fixed fields describe an Ethernet/IPv4 binding.
    pub fn is_ethernet_ipv4(&self) -> bool {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[HTYPE], b[HTYPE + 1]]) == ARP_HTYPE_ETHERNET
            && u16::from_be_bytes([b[PTYPE], b[PTYPE + 1]]) == ARP_PTYPE_IPV4
            && b[HLEN] == ARP_HLEN_ETHERNET
            && b[PLEN] == ARP_PLEN_IPV4
    }

    /// Operation code (1 = request, 2 = reply).
    #[inline]
    pub fn oper(&self) -> u16 {
        let b = self.buffer.as_ref();
        u16::from_be_bytes([b[OPER], b[OPER + 1]])
    }

    /// Sender hardware address.
    #[inline]
    pub fn sender_hw(&self) -> MacAddr {
        self.mac_at(SHA)
    }

    /// Sender protocol address.
    #[inline]
    pub fn sender_ip(&self) -> Ipv4Addr {
        self.ip_at(SPA)
    }

    /// Target hardware address.
    #[inline]
    pub fn target_hw(&self) -> MacAddr {
        self.mac_at(THA)
    }

    /// Target protocol address.
    #[inline]
    pub fn target_ip(&self) -> Ipv4Addr {
        self.ip_at(TPA)
    }

    fn mac_at(&self, offset: usize) -> MacAddr {
        let b = self.buffer.as_ref();
        let mut mac = [0u8; ETH_ADDR_LEN];
        mac.copy_from_slice(&b[offset..offset + ETH_ADDR_LEN]);
        MacAddr(mac)
    }

    fn ip_at(&self, offset: usize) -> Ipv4Addr {
        let b = self.buffer.as_ref();
        Ipv4Addr([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> ArpPacket<T> {
    /// Set the operation code.
    #[inline]
    pub fn set_oper(&mut self, oper: u16) {
        self.buffer.as_mut()[OPER..OPER + 2].copy_from_slice(&oper.to_be_bytes());
    }

    /// Set the sender hardware address.
    #[inline]
    pub fn set_sender_hw(&mut self, mac: MacAddr) {
        self.buffer.as_mut()[SHA..SHA + ETH_ADDR_LEN].copy_from_slice(&mac.0);
    }

    /// Set the sender protocol address.
    #[inline]
    pub fn set_sender_ip(&mut self, ip: Ipv4Addr) {
        self.buffer.as_mut()[SPA..SPA + 4].copy_from_slice(&ip.0);
    }

    /// Set the target hardware address.
    #[inline]
    pub fn set_target_hw(&mut self, mac: MacAddr) {
        self.buffer.as_mut()[THA..THA + ETH_ADDR_LEN].copy_from_slice(&mac.0);
    }

    /// Set the target protocol address.
    #[inline]
    pub fn set_target_ip(&mut self, ip: Ipv4Addr) {
        self.buffer.as_mut()[TPA..TPA + 4].copy_from_slice(&ip.0);
    }

    /// Write the fixed Ethernet/IPv4 binding fields.
    pub fn fill_ethernet_ipv4(&mut self, oper: u16) {
        let b = self.buffer.as_mut();
        b[HTYPE..HTYPE + 2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
        b[PTYPE..PTYPE + 2].copy_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
        b[HLEN] = ARP_HLEN_ETHERNET;
        b[PLEN] = ARP_PLEN_IPV4;
        b[OPER..OPER + 2].copy_from_slice(&oper.to_be_bytes());
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Build a broadcast ARP request frame asking for `target_ip`.
///
/// Sender hardware/protocol addresses come from the emitting interface.  The
/// target hardware address is filled with all-ones padding, matching the
/// broadcast Ethernet destination.
pub fn build_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];

    let mut eth = EthernetFrame::new_unchecked(&mut frame[..]);
    eth.fill(MacAddr::BROADCAST, sender_mac, ETHERTYPE_ARP);

    let mut arp = ArpPacket::new_unchecked(&mut frame[ETH_HEADER_LEN..]);
    arp.fill_ethernet_ipv4(ARP_OPER_REQUEST);
    arp.set_sender_hw(sender_mac);
    arp.set_sender_ip(sender_ip);
    arp.set_target_hw(MacAddr::BROADCAST);
    arp.set_target_ip(target_ip);

    frame
}

/// Rewrite a received ARP request frame into the matching reply, in place.
///
/// Swaps the hardware addresses at both layers, flips the opcode, moves the
/// requester to the target slots, and installs `local_mac` / `local_ip` as
/// the sender.  The caller must have validated the frame length (Ethernet +
/// ARP body) beforehand; undersized frames are left untouched.
pub fn rewrite_into_reply(frame: &mut [u8], local_mac: MacAddr, local_ip: Ipv4Addr) {
    if frame.len() < ETH_HEADER_LEN + ARP_PACKET_LEN {
        return;
    }

    let mut eth = EthernetFrame::new_unchecked(&mut frame[..]);
    let requester_mac = eth.src_addr();
    eth.set_dst_addr(requester_mac);
    eth.set_src_addr(local_mac);

    let mut arp = ArpPacket::new_unchecked(&mut frame[ETH_HEADER_LEN..]);
    let requester_ip = arp.sender_ip();
    arp.set_oper(ARP_OPER_REPLY);
    arp.set_target_hw(requester_mac);
    arp.set_target_ip(requester_ip);
    arp.set_sender_hw(local_mac);
    arp.set_sender_ip(local_ip);
}
