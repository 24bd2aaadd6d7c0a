//! Packet pipeline — single entry point for all received frames.
//!
//! Every frame the I/O shim delivers passes through
//! [`Router::handle_frame`], which classifies by EtherType and walks the
//! Ethernet/ARP/IPv4/ICMP state machine: ARP requests for local addresses
//! are answered, ARP replies feed the resolution cache and release buffered
//! frames, IPv4 datagrams are answered locally (echo) or forwarded by
//! longest-prefix match.  Datagrams the router refuses come back to the
//! sender as ICMP errors; malformed frames are logged and dropped.
//!
//! The receive buffer is lent by the shim — anything kept past the call
//! (queued frames, synthesized replies) is an owned copy.

use std::time::Instant;

use log::{debug, trace};

use vroute_wire::arp::{self, ArpPacket};
use vroute_wire::ethernet::EthernetFrame;
use vroute_wire::icmp::{self, IcmpPacket};
use vroute_wire::ipv4::Ipv4Packet;
use vroute_wire::{
    ARP_OPER_REPLY, ARP_OPER_REQUEST, ETH_HEADER_LEN, EtherType, ICMP_CODE_HOST_UNREACHABLE,
    ICMP_CODE_NET_UNREACHABLE, ICMP_CODE_PORT_UNREACHABLE, ICMP_CODE_PROTOCOL_UNREACHABLE,
    ICMP_CODE_TTL_EXCEEDED, ICMP_HEADER_LEN, ICMP_TYPE_DEST_UNREACHABLE, ICMP_TYPE_ECHO_REQUEST,
    ICMP_TYPE_TIME_EXCEEDED, IpProtocol, Ipv4Addr,
};

use crate::arp_cache::{ArpCache, SweepAction};
use crate::error::NetError;
use crate::iface::{IfaceTable, Interface};
use crate::route::RouteTable;

/// Transmit side of the I/O shim.
///
/// `send` is treated as synchronous and potentially blocking; the router
/// never calls it while holding the cache lock.  The frame buffer belongs to
/// the router only until the call returns.
pub trait FrameSink: Send + Sync {
    /// Emit one frame on the named interface.
    fn send(&self, frame: &[u8], iface: &str) -> Result<(), NetError>;
}

/// The router: immutable interface and route tables, the ARP cache, and the
/// shim's transmit side.
///
/// `handle_frame` may run on any number of shim threads concurrently; see the
/// [crate documentation](crate) for the locking discipline.
pub struct Router {
    ifaces: IfaceTable,
    routes: RouteTable,
    cache: ArpCache,
    sink: Box<dyn FrameSink>,
}

impl Router {
    /// Assemble a router from its startup tables and the shim's sink.
    pub fn new(ifaces: IfaceTable, routes: RouteTable, sink: Box<dyn FrameSink>) -> Self {
        Self {
            ifaces,
            routes,
            cache: ArpCache::new(),
            sink,
        }
    }

    /// The interface registry.
    pub fn ifaces(&self) -> &IfaceTable {
        &self.ifaces
    }

    /// The routing table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The ARP cache.
    pub fn cache(&self) -> &ArpCache {
        &self.cache
    }

    // =========================================================================
    // Entry point
    // =========================================================================

    /// Process one received frame.
    ///
    /// `frame` is lent by the shim; `ingress` names the interface it arrived
    /// on.  Never fails to the caller — every failure ends as a logged drop
    /// or an ICMP answer.
    pub fn handle_frame(&self, frame: &[u8], ingress: &str) {
        let Some(eth) = EthernetFrame::parse(frame) else {
            debug!("rx: frame too short ({} < {})", frame.len(), ETH_HEADER_LEN);
            return;
        };
        match EtherType::from_u16(eth.ethertype()) {
            Some(EtherType::Arp) => self.handle_arp(frame, ingress),
            Some(EtherType::Ipv4) => self.handle_ipv4(frame, ingress),
            None => {
                trace!("rx: unknown EtherType 0x{:04x}, dropping", eth.ethertype());
            }
        }
    }

    // =========================================================================
    // ARP
    // =========================================================================

    fn handle_arp(&self, frame: &[u8], ingress: &str) {
        let Some(arp) = ArpPacket::parse(&frame[ETH_HEADER_LEN..]) else {
            debug!("arp: frame too short ({} bytes)", frame.len());
            return;
        };
        if !arp.is_ethernet_ipv4() {
            debug!("arp: not an Ethernet/IPv4 binding, dropping");
            return;
        }
        match arp.oper() {
            ARP_OPER_REQUEST => self.handle_arp_request(frame, &arp, ingress),
            ARP_OPER_REPLY => self.handle_arp_reply(&arp),
            oper => debug!("arp: unknown opcode {}, dropping", oper),
        }
    }

    /// Answer an ARP request addressed to one of our interfaces, and learn
    /// the requester's binding while at it.
    fn handle_arp_request(&self, frame: &[u8], arp: &ArpPacket<&[u8]>, ingress: &str) {
        let target = arp.target_ip();
        let Some(local) = self.ifaces.by_ip(target) else {
            trace!("arp: request for {} is not ours, ignoring", target);
            return;
        };

        let requester_mac = arp.sender_hw();
        let requester_ip = arp.sender_ip();

        let mut reply = frame.to_vec();
        arp::rewrite_into_reply(&mut reply, local.mac, local.ip);
        debug!(
            "arp: answering request for {} from {} ({}) out {}",
            target, requester_ip, requester_mac, ingress
        );
        self.tx(&reply, ingress);

        // The requester proved its own binding; remember it.  Any detached
        // request is dropped unused.
        let _ = self.cache.insert(requester_mac, requester_ip, Instant::now());
    }

    /// Record a resolution from an ARP reply and release the frames that
    /// were waiting on it.
    fn handle_arp_reply(&self, arp: &ArpPacket<&[u8]>) {
        let sender_mac = arp.sender_hw();
        let sender_ip = arp.sender_ip();
        let target_mac = arp.target_hw();

        if target_mac.is_broadcast() {
            debug!("arp: reply with broadcast target hardware, dropping");
            return;
        }
        if sender_ip.is_unspecified() {
            debug!("arp: reply with zero sender IP, dropping");
            return;
        }

        debug!("arp: learned {} -> {}", sender_ip, sender_mac);
        let Some(request) = self.cache.insert(sender_mac, sender_ip, Instant::now()) else {
            return;
        };

        for mut pending in request.packets.into_iter().rev() {
            let mut eth = EthernetFrame::new_unchecked(&mut pending.frame[..]);
            eth.set_dst_addr(sender_mac);
            eth.set_src_addr(target_mac);
            trace!("arp: releasing queued frame out {}", pending.iface);
            self.tx(&pending.frame, &pending.iface);
        }
    }

    // =========================================================================
    // IPv4
    // =========================================================================

    fn handle_ipv4(&self, frame: &[u8], ingress: &str) {
        let Some(ip) = Ipv4Packet::parse(&frame[ETH_HEADER_LEN..]) else {
            debug!("ipv4: truncated or malformed header ({} byte frame)", frame.len());
            return;
        };
        if !ip.verify_checksum() {
            debug!("ipv4: bad header checksum from {}", ip.src_addr());
            return;
        }

        match self.ifaces.by_ip(ip.dst_addr()) {
            Some(local) => self.deliver_local(frame, &ip, local, ingress),
            None => self.forward(frame, &ip),
        }
    }

    /// A datagram addressed to the router itself: answer echo requests,
    /// refuse everything else.
    fn deliver_local(
        &self,
        frame: &[u8],
        ip: &Ipv4Packet<&[u8]>,
        local: &Interface,
        ingress: &str,
    ) {
        match IpProtocol::from_u8(ip.protocol()) {
            Some(IpProtocol::Icmp) => self.answer_echo(frame, ip, local, ingress),
            Some(IpProtocol::Tcp) | Some(IpProtocol::Udp) => {
                debug!(
                    "ipv4: protocol {} for us from {} has no listener, answering port unreachable",
                    ip.protocol(),
                    ip.src_addr()
                );
                self.send_icmp_error(frame, ICMP_TYPE_DEST_UNREACHABLE, ICMP_CODE_PORT_UNREACHABLE);
            }
            None => {
                debug!(
                    "ipv4: protocol {} not supported, answering protocol unreachable",
                    ip.protocol()
                );
                self.send_icmp_error(
                    frame,
                    ICMP_TYPE_DEST_UNREACHABLE,
                    ICMP_CODE_PROTOCOL_UNREACHABLE,
                );
            }
        }
    }

    /// Turn an echo request into an echo reply on the ingress interface.
    fn answer_echo(&self, frame: &[u8], ip: &Ipv4Packet<&[u8]>, local: &Interface, ingress: &str) {
        let icmp_start = ETH_HEADER_LEN + ip.header_len();
        if frame.len() < icmp_start + ICMP_HEADER_LEN {
            debug!("icmp: truncated message from {}, dropping", ip.src_addr());
            return;
        }
        let message = IcmpPacket::new_unchecked(&frame[icmp_start..]);
        if !message.verify_checksum() {
            debug!("icmp: bad checksum from {}, dropping", ip.src_addr());
            return;
        }
        if message.icmp_type() != ICMP_TYPE_ECHO_REQUEST {
            // Informational ICMP for us; nothing to answer, and errors about
            // ICMP messages must not be generated.
            trace!("icmp: type {} for us, consuming", message.icmp_type());
            return;
        }

        let peer = ip.src_addr();
        let mut reply = frame.to_vec();
        icmp::rewrite_into_echo_reply(&mut reply[icmp_start..]);

        let mut ip_out = Ipv4Packet::new_unchecked(&mut reply[ETH_HEADER_LEN..]);
        ip_out.set_dst_addr(peer);
        ip_out.set_src_addr(local.ip);
        ip_out.fill_checksum();

        let mut eth = EthernetFrame::new_unchecked(&mut reply[..]);
        let old_dst = eth.dst_addr();
        let old_src = eth.src_addr();
        eth.set_dst_addr(old_src);
        eth.set_src_addr(old_dst);

        debug!("icmp: echo reply to {} out {}", peer, ingress);
        self.tx(&reply, ingress);
    }

    /// Forward a transit datagram: route, decrement TTL, resolve the next
    /// hop, emit or queue.
    fn forward(&self, frame: &[u8], ip: &Ipv4Packet<&[u8]>) {
        let dst = ip.dst_addr();
        let Some(route) = self.routes.longest_match(dst) else {
            debug!("ipv4: no route to {}, answering network unreachable", dst);
            self.send_icmp_error(frame, ICMP_TYPE_DEST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE);
            return;
        };

        // Decrementing a TTL of 1 (or an already-expired 0) would reach zero.
        if ip.ttl() <= 1 {
            debug!("ipv4: TTL expired on {} -> {}", ip.src_addr(), dst);
            self.send_icmp_error(frame, ICMP_TYPE_TIME_EXCEEDED, ICMP_CODE_TTL_EXCEEDED);
            return;
        }

        let mut fwd = frame.to_vec();
        let mut ip_out = Ipv4Packet::new_unchecked(&mut fwd[ETH_HEADER_LEN..]);
        ip_out.set_ttl(ip.ttl() - 1);
        ip_out.fill_checksum();

        let next_hop = route.next_hop(dst);
        match self.cache.lookup(next_hop) {
            Some(mac) => {
                let Some(egress) = self.ifaces.by_name(&route.iface) else {
                    debug!("ipv4: route names unknown interface {}, dropping", route.iface);
                    return;
                };
                let mut eth = EthernetFrame::new_unchecked(&mut fwd[..]);
                eth.set_src_addr(egress.mac);
                eth.set_dst_addr(mac);
                trace!(
                    "ipv4: {} -> {} via {} out {}",
                    ip.src_addr(),
                    dst,
                    next_hop,
                    route.iface
                );
                self.tx(&fwd, &route.iface);
            }
            None => {
                debug!("ipv4: {} unresolved, queueing frame for {}", next_hop, dst);
                self.cache.queue(next_hop, &fwd, &route.iface);
                // Fire the first probe now instead of waiting out the tick.
                if let Some(action) = self.cache.drive(next_hop, Instant::now()) {
                    self.execute(action);
                }
            }
        }
    }

    // =========================================================================
    // ICMP errors
    // =========================================================================

    /// Report `offending` back to its sender with the given ICMP type/code.
    ///
    /// The egress interface comes from a longest-prefix match on the original
    /// source; the error's IP source is that interface's address.  The
    /// Ethernet destination reuses the offending frame's source address — the
    /// sender is reachable where it was heard.
    fn send_icmp_error(&self, offending: &[u8], icmp_type: u8, icmp_code: u8) {
        let Some(eth) = EthernetFrame::parse(offending) else {
            return;
        };
        let Some(ip) = Ipv4Packet::parse(eth.payload()) else {
            return;
        };
        let sender = ip.src_addr();
        let Some(route) = self.routes.longest_match(sender) else {
            debug!("icmp: no route back to {}, cannot report", sender);
            return;
        };
        let Some(egress) = self.ifaces.by_name(&route.iface) else {
            debug!("icmp: route names unknown interface {}, dropping", route.iface);
            return;
        };

        debug!(
            "icmp: type {} code {} to {} out {}",
            icmp_type, icmp_code, sender, route.iface
        );
        let frame = icmp::build_error(
            egress.mac,
            eth.src_addr(),
            egress.ip,
            sender,
            icmp_type,
            icmp_code,
            eth.payload(),
        );
        self.tx(&frame, &route.iface);
    }

    // =========================================================================
    // Action execution
    // =========================================================================

    /// Execute I/O work the cache computed under its lock.
    pub(crate) fn execute(&self, action: SweepAction) {
        match action {
            SweepAction::Probe { iface, ip } => self.send_probe(&iface, ip),
            SweepAction::HostUnreachable { packets } => {
                for pending in packets.into_iter().rev() {
                    self.send_icmp_error(
                        &pending.frame,
                        ICMP_TYPE_DEST_UNREACHABLE,
                        ICMP_CODE_HOST_UNREACHABLE,
                    );
                }
            }
        }
    }

    /// Broadcast an ARP request for `ip` out of the named interface.
    fn send_probe(&self, iface: &str, ip: Ipv4Addr) {
        let Some(egress) = self.ifaces.by_name(iface) else {
            debug!("arp: probe interface {} unknown, dropping", iface);
            return;
        };
        debug!("arp: probing for {} out {}", ip, iface);
        let frame = arp::build_request(egress.mac, egress.ip, ip);
        self.tx(&frame, iface);
    }

    /// Emit one frame, logging transmit failures.
    fn tx(&self, frame: &[u8], iface: &str) {
        if let Err(err) = self.sink.send(frame, iface) {
            debug!("tx: send on {} failed: {}", iface, err);
        }
    }
}
