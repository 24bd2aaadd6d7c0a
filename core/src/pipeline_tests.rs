//! End-to-end tests for the packet pipeline.
//!
//! A two-interface router (10.0.0.1/24 on eth0, 192.168.1.1/24 on eth1,
//! default route through 192.168.1.254) is fed literal frames; everything it
//! emits lands in a recording sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use spin::Mutex;

use vroute_wire::arp::{self, ArpPacket};
use vroute_wire::ethernet::EthernetFrame;
use vroute_wire::icmp::IcmpPacket;
use vroute_wire::ipv4::Ipv4Packet;
use vroute_wire::{
    ARP_OPER_REPLY, ARP_OPER_REQUEST, ARP_PACKET_LEN, ETH_HEADER_LEN, ETHERTYPE_ARP,
    ETHERTYPE_IPV4, ICMP_FULL_HEADER_LEN, ICMP_TYPE_DEST_UNREACHABLE, ICMP_TYPE_ECHO_REPLY,
    ICMP_TYPE_ECHO_REQUEST, ICMP_TYPE_TIME_EXCEEDED, IPV4_HEADER_LEN, Ipv4Addr, MacAddr,
};

use crate::arp_cache::MAX_PROBES;
use crate::error::NetError;
use crate::iface::{IfaceTable, Interface};
use crate::pipeline::{FrameSink, Router};
use crate::route::{RouteEntry, RouteTable};

const ETH0_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
const ETH0_IP: Ipv4Addr = Ipv4Addr([10, 0, 0, 1]);
const ETH1_MAC: MacAddr = MacAddr([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
const ETH1_IP: Ipv4Addr = Ipv4Addr([192, 168, 1, 1]);

const HOST_MAC: MacAddr = MacAddr([0x00, 0xde, 0xad, 0xbe, 0xef, 0x00]);
const HOST_IP: Ipv4Addr = Ipv4Addr([10, 0, 0, 5]);

const GATEWAY_IP: Ipv4Addr = Ipv4Addr([192, 168, 1, 254]);
const GATEWAY_MAC: MacAddr = MacAddr([0x00, 0xca, 0xfe, 0x00, 0x00, 0x01]);

const FAR_IP: Ipv4Addr = Ipv4Addr([8, 8, 8, 8]);

// =============================================================================
// Harness
// =============================================================================

/// Captures every frame the router emits.
#[derive(Clone, Default)]
struct RecordingSink {
    frames: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<(String, Vec<u8>)> {
        core::mem::take(&mut *self.frames.lock())
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: &[u8], iface: &str) -> Result<(), NetError> {
        self.frames.lock().push((iface.to_string(), frame.to_vec()));
        Ok(())
    }
}

fn iface(name: &str, mac: MacAddr, ip: Ipv4Addr) -> Interface {
    Interface {
        name: name.to_string(),
        mac,
        ip,
        mask: Ipv4Addr([255, 255, 255, 0]),
    }
}

fn route(dest: [u8; 4], mask: [u8; 4], gateway: Ipv4Addr, iface: &str) -> RouteEntry {
    RouteEntry {
        dest: Ipv4Addr(dest),
        mask: Ipv4Addr(mask),
        gateway,
        iface: iface.to_string(),
    }
}

fn test_router() -> (Router, RecordingSink) {
    let ifaces = IfaceTable::new(vec![
        iface("eth0", ETH0_MAC, ETH0_IP),
        iface("eth1", ETH1_MAC, ETH1_IP),
    ]);
    let routes = RouteTable::new(vec![
        route([10, 0, 0, 0], [255, 255, 255, 0], Ipv4Addr::UNSPECIFIED, "eth0"),
        route([192, 168, 1, 0], [255, 255, 255, 0], Ipv4Addr::UNSPECIFIED, "eth1"),
        route([0, 0, 0, 0], [0, 0, 0, 0], GATEWAY_IP, "eth1"),
    ]);
    let sink = RecordingSink::default();
    let router = Router::new(ifaces, routes, Box::new(sink.clone()));
    (router, sink)
}

/// An IPv4-in-Ethernet frame with a valid header checksum.
fn ipv4_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    let total = IPV4_HEADER_LEN + payload.len();
    let mut frame = vec![0u8; ETH_HEADER_LEN + total];
    EthernetFrame::new_unchecked(&mut frame[..]).fill(dst_mac, src_mac, ETHERTYPE_IPV4);
    let mut ip = Ipv4Packet::new_unchecked(&mut frame[ETH_HEADER_LEN..]);
    ip.set_version_and_len(IPV4_HEADER_LEN);
    ip.set_total_len(total as u16);
    ip.set_ttl(ttl);
    ip.set_protocol(protocol);
    ip.set_src_addr(src);
    ip.set_dst_addr(dst);
    ip.fill_checksum();
    frame[ETH_HEADER_LEN + IPV4_HEADER_LEN..].copy_from_slice(payload);
    frame
}

/// An ICMP echo request from the host to eth0.
fn echo_request_frame(ident: u16, seq: u16) -> Vec<u8> {
    let mut message = vec![0u8; ICMP_FULL_HEADER_LEN + 4];
    message[0] = ICMP_TYPE_ECHO_REQUEST;
    message[4..6].copy_from_slice(&ident.to_be_bytes());
    message[6..8].copy_from_slice(&seq.to_be_bytes());
    message[ICMP_FULL_HEADER_LEN..].copy_from_slice(b"ping");
    IcmpPacket::new_unchecked(&mut message[..]).fill_checksum();
    ipv4_frame(HOST_MAC, ETH0_MAC, HOST_IP, ETH0_IP, 1, 64, &message)
}

/// An ARP reply frame as a resolving peer would send it.
fn arp_reply_frame(
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
    EthernetFrame::new_unchecked(&mut frame[..]).fill(target_mac, sender_mac, ETHERTYPE_ARP);
    let mut arp = ArpPacket::new_unchecked(&mut frame[ETH_HEADER_LEN..]);
    arp.fill_ethernet_ipv4(ARP_OPER_REPLY);
    arp.set_sender_hw(sender_mac);
    arp.set_sender_ip(sender_ip);
    arp.set_target_hw(target_mac);
    arp.set_target_ip(target_ip);
    frame
}

/// A transit datagram from the host to an off-link destination.
fn transit_udp(ttl: u8) -> Vec<u8> {
    ipv4_frame(HOST_MAC, ETH0_MAC, HOST_IP, FAR_IP, 17, ttl, &[0x55; 12])
}

fn assert_probe(iface: &str, frame: &[u8], expect_iface: &str, expect_target: Ipv4Addr) {
    assert_eq!(iface, expect_iface);
    let eth = EthernetFrame::parse(frame).expect("probe parses");
    assert_eq!(eth.dst_addr(), MacAddr::BROADCAST);
    assert_eq!(eth.ethertype(), ETHERTYPE_ARP);
    let arp = ArpPacket::parse(&frame[ETH_HEADER_LEN..]).expect("probe parses");
    assert_eq!(arp.oper(), ARP_OPER_REQUEST);
    assert_eq!(arp.target_ip(), expect_target);
}

// =============================================================================
// ARP scenarios
// =============================================================================

#[test]
fn arp_request_for_local_address_is_answered() {
    let (router, sink) = test_router();

    router.handle_frame(&arp::build_request(HOST_MAC, HOST_IP, ETH0_IP), "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let (out_iface, reply) = &frames[0];
    assert_eq!(out_iface, "eth0");

    let eth = EthernetFrame::parse(&reply[..]).expect("reply parses");
    assert_eq!(eth.dst_addr(), HOST_MAC);
    assert_eq!(eth.src_addr(), ETH0_MAC);
    assert_eq!(eth.ethertype(), ETHERTYPE_ARP);

    let arp = ArpPacket::parse(&reply[ETH_HEADER_LEN..]).expect("reply parses");
    assert_eq!(arp.oper(), ARP_OPER_REPLY);
    assert_eq!(arp.sender_hw(), ETH0_MAC);
    assert_eq!(arp.sender_ip(), ETH0_IP);
    assert_eq!(arp.target_hw(), HOST_MAC);
    assert_eq!(arp.target_ip(), HOST_IP);

    // The requester's binding was learned on the way.
    assert_eq!(router.cache().lookup(HOST_IP), Some(HOST_MAC));
}

#[test]
fn arp_request_for_foreign_address_is_ignored() {
    let (router, sink) = test_router();
    router.handle_frame(&arp::build_request(HOST_MAC, HOST_IP, Ipv4Addr([10, 0, 0, 9])), "eth0");
    assert!(sink.take().is_empty());
}

#[test]
fn arp_reply_sanity_rejects() {
    let (router, sink) = test_router();

    // Broadcast target hardware address.
    let bogus = arp_reply_frame(GATEWAY_MAC, GATEWAY_IP, MacAddr::BROADCAST, ETH1_IP);
    router.handle_frame(&bogus, "eth1");

    // Zero sender protocol address.
    let bogus = arp_reply_frame(GATEWAY_MAC, Ipv4Addr::UNSPECIFIED, ETH1_MAC, ETH1_IP);
    router.handle_frame(&bogus, "eth1");

    assert!(sink.take().is_empty());
    assert_eq!(router.cache().valid_entries(), 0);
}

// =============================================================================
// Local delivery scenarios
// =============================================================================

#[test]
fn echo_request_is_answered_in_kind() {
    let (router, sink) = test_router();

    router.handle_frame(&echo_request_frame(0xabcd, 1), "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let (out_iface, reply) = &frames[0];
    assert_eq!(out_iface, "eth0");

    let eth = EthernetFrame::parse(&reply[..]).expect("reply parses");
    assert_eq!(eth.dst_addr(), HOST_MAC);
    assert_eq!(eth.src_addr(), ETH0_MAC);

    let ip = Ipv4Packet::parse(&reply[ETH_HEADER_LEN..]).expect("reply parses");
    assert_eq!(ip.src_addr(), ETH0_IP);
    assert_eq!(ip.dst_addr(), HOST_IP);
    assert!(ip.verify_checksum());

    let message = IcmpPacket::parse(&reply[ETH_HEADER_LEN + IPV4_HEADER_LEN..]).expect("parses");
    assert_eq!(message.icmp_type(), ICMP_TYPE_ECHO_REPLY);
    assert_eq!(message.code(), 0);
    assert_eq!(message.echo_ident(), 0xabcd);
    assert_eq!(message.echo_seq(), 1);
    assert!(message.verify_checksum());
}

#[test]
fn echo_request_with_bad_icmp_checksum_is_dropped() {
    let (router, sink) = test_router();
    let mut frame = echo_request_frame(0xabcd, 1);
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    router.handle_frame(&frame, "eth0");
    assert!(sink.take().is_empty());
}

#[test]
fn non_echo_icmp_for_us_is_consumed_silently() {
    let (router, sink) = test_router();
    let mut message = vec![0u8; ICMP_FULL_HEADER_LEN];
    message[0] = ICMP_TYPE_ECHO_REPLY;
    IcmpPacket::new_unchecked(&mut message[..]).fill_checksum();
    let frame = ipv4_frame(HOST_MAC, ETH0_MAC, HOST_IP, ETH0_IP, 1, 64, &message);
    router.handle_frame(&frame, "eth0");
    assert!(sink.take().is_empty());
}

#[test]
fn tcp_for_us_gets_port_unreachable() {
    let (router, sink) = test_router();
    let offending = ipv4_frame(HOST_MAC, ETH0_MAC, HOST_IP, ETH0_IP, 6, 64, &[0x66; 20]);
    router.handle_frame(&offending, "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let (out_iface, error) = &frames[0];
    assert_eq!(out_iface, "eth0");

    let eth = EthernetFrame::parse(&error[..]).expect("error parses");
    assert_eq!(eth.dst_addr(), HOST_MAC);
    assert_eq!(eth.src_addr(), ETH0_MAC);

    let ip = Ipv4Packet::parse(&error[ETH_HEADER_LEN..]).expect("error parses");
    assert_eq!(ip.src_addr(), ETH0_IP);
    assert_eq!(ip.dst_addr(), HOST_IP);
    assert!(ip.verify_checksum());

    let region = &error[ETH_HEADER_LEN + IPV4_HEADER_LEN..];
    let message = IcmpPacket::parse(region).expect("error parses");
    assert_eq!(message.icmp_type(), ICMP_TYPE_DEST_UNREACHABLE);
    assert_eq!(message.code(), 3);
    assert!(message.verify_checksum());
    // The quote carries the offending IP header and its first 8 payload bytes.
    let quoted = &region[ICMP_FULL_HEADER_LEN..];
    assert_eq!(quoted, &offending[ETH_HEADER_LEN..ETH_HEADER_LEN + IPV4_HEADER_LEN + 8]);
}

#[test]
fn unknown_protocol_for_us_gets_protocol_unreachable() {
    let (router, sink) = test_router();
    let offending = ipv4_frame(HOST_MAC, ETH0_MAC, HOST_IP, ETH0_IP, 0x2f, 64, &[0; 8]);
    router.handle_frame(&offending, "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let message = IcmpPacket::parse(&frames[0].1[ETH_HEADER_LEN + IPV4_HEADER_LEN..])
        .expect("error parses");
    assert_eq!(message.icmp_type(), ICMP_TYPE_DEST_UNREACHABLE);
    assert_eq!(message.code(), 2);
}

// =============================================================================
// Forwarding scenarios
// =============================================================================

#[test]
fn forward_with_cached_next_hop() {
    let (router, sink) = test_router();
    let _ = router.cache().insert(GATEWAY_MAC, GATEWAY_IP, Instant::now());

    let original = transit_udp(64);
    router.handle_frame(&original, "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let (out_iface, forwarded) = &frames[0];
    assert_eq!(out_iface, "eth1");

    let eth = EthernetFrame::parse(&forwarded[..]).expect("parses");
    assert_eq!(eth.src_addr(), ETH1_MAC);
    assert_eq!(eth.dst_addr(), GATEWAY_MAC);

    let ip = Ipv4Packet::parse(&forwarded[ETH_HEADER_LEN..]).expect("parses");
    assert_eq!(ip.ttl(), 63);
    assert!(ip.verify_checksum());
    assert_eq!(ip.src_addr(), HOST_IP);
    assert_eq!(ip.dst_addr(), FAR_IP);

    // Conservation: past the rewritten fields the datagram is untouched.
    assert_eq!(
        &forwarded[ETH_HEADER_LEN + IPV4_HEADER_LEN..],
        &original[ETH_HEADER_LEN + IPV4_HEADER_LEN..]
    );
}

#[test]
fn forward_miss_probes_then_releases_on_reply() {
    let (router, sink) = test_router();

    router.handle_frame(&transit_udp(64), "eth0");

    // The miss queued the frame and fired the first probe immediately.
    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    assert_probe(&frames[0].0, &frames[0].1, "eth1", GATEWAY_IP);
    let probe = ArpPacket::parse(&frames[0].1[ETH_HEADER_LEN..]).expect("parses");
    assert_eq!(probe.sender_hw(), ETH1_MAC);
    assert_eq!(probe.sender_ip(), ETH1_IP);
    assert_eq!(router.cache().pending_count(GATEWAY_IP), 1);

    // The gateway answers; the queued datagram goes out rewritten.
    router.handle_frame(
        &arp_reply_frame(GATEWAY_MAC, GATEWAY_IP, ETH1_MAC, ETH1_IP),
        "eth1",
    );

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let (out_iface, forwarded) = &frames[0];
    assert_eq!(out_iface, "eth1");

    let eth = EthernetFrame::parse(&forwarded[..]).expect("parses");
    assert_eq!(eth.dst_addr(), GATEWAY_MAC);
    assert_eq!(eth.src_addr(), ETH1_MAC);
    let ip = Ipv4Packet::parse(&forwarded[ETH_HEADER_LEN..]).expect("parses");
    assert_eq!(ip.ttl(), 63);
    assert!(ip.verify_checksum());

    assert_eq!(router.cache().lookup(GATEWAY_IP), Some(GATEWAY_MAC));
    assert_eq!(router.cache().request_count(), 0);
}

#[test]
fn forward_unresolvable_ends_in_host_unreachable() {
    let (router, sink) = test_router();

    router.handle_frame(&transit_udp(64), "eth0");
    let base = Instant::now();
    for i in 1..=(MAX_PROBES as u64) {
        router.sweep_tick(base + Duration::from_millis(1100 * i));
    }

    let frames = sink.take();
    // One immediate probe, four sweeper probes, then the failure report.
    assert_eq!(frames.len(), MAX_PROBES as usize + 1);
    for (out_iface, frame) in &frames[..MAX_PROBES as usize] {
        assert_probe(out_iface, frame, "eth1", GATEWAY_IP);
    }

    let (out_iface, error) = &frames[MAX_PROBES as usize];
    assert_eq!(out_iface, "eth0");
    let eth = EthernetFrame::parse(&error[..]).expect("parses");
    assert_eq!(eth.dst_addr(), HOST_MAC);
    assert_eq!(eth.src_addr(), ETH0_MAC);

    let ip = Ipv4Packet::parse(&error[ETH_HEADER_LEN..]).expect("parses");
    assert_eq!(ip.src_addr(), ETH0_IP);
    assert_eq!(ip.dst_addr(), HOST_IP);

    let region = &error[ETH_HEADER_LEN + IPV4_HEADER_LEN..];
    let message = IcmpPacket::parse(region).expect("parses");
    assert_eq!(message.icmp_type(), ICMP_TYPE_DEST_UNREACHABLE);
    assert_eq!(message.code(), 1);
    assert!(message.verify_checksum());

    // The quoted datagram is the queued copy: host → far destination.
    let quoted = Ipv4Packet::parse(&region[ICMP_FULL_HEADER_LEN..]).expect("parses");
    assert_eq!(quoted.src_addr(), HOST_IP);
    assert_eq!(quoted.dst_addr(), FAR_IP);

    // The request is gone for good.
    assert_eq!(router.cache().request_count(), 0);
    router.sweep_tick(base + Duration::from_secs(30));
    assert!(sink.take().is_empty());
}

#[test]
fn ttl_expiry_answers_time_exceeded() {
    let (router, sink) = test_router();

    router.handle_frame(&transit_udp(1), "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let (out_iface, error) = &frames[0];
    assert_eq!(out_iface, "eth0");

    let ip = Ipv4Packet::parse(&error[ETH_HEADER_LEN..]).expect("parses");
    assert_eq!(ip.dst_addr(), HOST_IP);
    let message = IcmpPacket::parse(&error[ETH_HEADER_LEN + IPV4_HEADER_LEN..]).expect("parses");
    assert_eq!(message.icmp_type(), ICMP_TYPE_TIME_EXCEEDED);
    assert_eq!(message.code(), 0);
}

#[test]
fn no_route_answers_network_unreachable() {
    // A router with only the connected /24 — nothing covers 8.8.8.8.
    let ifaces = IfaceTable::new(vec![iface("eth0", ETH0_MAC, ETH0_IP)]);
    let routes = RouteTable::new(vec![route(
        [10, 0, 0, 0],
        [255, 255, 255, 0],
        Ipv4Addr::UNSPECIFIED,
        "eth0",
    )]);
    let sink = RecordingSink::default();
    let router = Router::new(ifaces, routes, Box::new(sink.clone()));

    router.handle_frame(&transit_udp(64), "eth0");

    let frames = sink.take();
    assert_eq!(frames.len(), 1);
    let message = IcmpPacket::parse(&frames[0].1[ETH_HEADER_LEN + IPV4_HEADER_LEN..])
        .expect("parses");
    assert_eq!(message.icmp_type(), ICMP_TYPE_DEST_UNREACHABLE);
    assert_eq!(message.code(), 0);
}

// =============================================================================
// Drop paths
// =============================================================================

#[test]
fn malformed_frames_are_dropped_silently() {
    let (router, sink) = test_router();

    // Too short for Ethernet.
    router.handle_frame(&[0u8; 10], "eth0");

    // ARP EtherType but a truncated body.
    let mut runt = vec![0u8; ETH_HEADER_LEN + ARP_PACKET_LEN - 2];
    EthernetFrame::new_unchecked(&mut runt[..]).fill(ETH0_MAC, HOST_MAC, ETHERTYPE_ARP);
    router.handle_frame(&runt, "eth0");

    // IPv4 EtherType but a truncated header.
    let frame = transit_udp(64);
    router.handle_frame(&frame[..ETH_HEADER_LEN + 12], "eth0");

    // Unknown EtherType.
    let mut vlan = vec![0u8; 64];
    EthernetFrame::new_unchecked(&mut vlan[..]).fill(ETH0_MAC, HOST_MAC, 0x8100);
    router.handle_frame(&vlan, "eth0");

    assert!(sink.take().is_empty());
}

#[test]
fn bad_ip_checksum_is_dropped_silently() {
    let (router, sink) = test_router();
    let mut frame = transit_udp(64);
    frame[ETH_HEADER_LEN + 10] ^= 0xff;
    router.handle_frame(&frame, "eth0");
    assert!(sink.take().is_empty());
}
