//! Wire-format codec for Ethernet II, ARP, IPv4, and ICMP.
//!
//! The codec is stateless: it exposes typed, bounds-checked views over
//! contiguous byte buffers plus builders for the handful of frames the router
//! synthesizes itself (ARP probes, ARP replies, ICMP errors).  All multibyte
//! fields are big-endian on the wire; views convert at the accessor boundary
//! so the rest of the router never touches raw byte offsets.
//!
//! # Structural minimums
//!
//! A view constructor accepts a buffer only if it covers the structural
//! prefix being interpreted:
//!
//! - Ethernet header: 14 bytes
//! - ARP packet (Ethernet/IPv4 body): 28 bytes
//! - IPv4 header: 20 bytes
//! - ICMP header: 4 bytes
//!
//! Anything shorter fails parsing; the caller decides whether to log or drop.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod types;

pub use types::{EtherType, IpProtocol, Ipv4Addr, MacAddr};

#[cfg(test)]
mod checksum_tests;

// =============================================================================
// Ethernet
// =============================================================================

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETH_HEADER_LEN: usize = 14;
pub const ETH_ADDR_LEN: usize = 6;

// =============================================================================
// ARP (Ethernet + IPv4 only)
// =============================================================================

pub const ARP_HTYPE_ETHERNET: u16 = 1;
pub const ARP_PTYPE_IPV4: u16 = ETHERTYPE_IPV4;
pub const ARP_HLEN_ETHERNET: u8 = 6;
pub const ARP_PLEN_IPV4: u8 = 4;
pub const ARP_OPER_REQUEST: u16 = 1;
pub const ARP_OPER_REPLY: u16 = 2;
pub const ARP_PACKET_LEN: usize = 28;

// =============================================================================
// IPv4
// =============================================================================

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV4_VERSION: u8 = 4;

// =============================================================================
// ICMP
// =============================================================================

/// Common prefix of every ICMP message: type, code, checksum.
pub const ICMP_HEADER_LEN: usize = 4;
/// Echo request/reply and error messages carry a 4-byte rest-of-header too.
pub const ICMP_FULL_HEADER_LEN: usize = 8;

pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;
pub const ICMP_TYPE_TIME_EXCEEDED: u8 = 11;

pub const ICMP_CODE_NET_UNREACHABLE: u8 = 0;
pub const ICMP_CODE_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_CODE_PROTOCOL_UNREACHABLE: u8 = 2;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;
pub const ICMP_CODE_TTL_EXCEEDED: u8 = 0;

/// Payload bytes of the offending datagram echoed inside an ICMP error,
/// counted after its IP header.
pub const ICMP_ERROR_PAYLOAD_LEN: usize = 8;
