//! IPv4 routing table with longest-prefix-match lookup.
//!
//! Routes live in one ordered `Vec`, fixed at startup.  Lookup is a full
//! linear scan tracking the best match by mask length; ties fall to the
//! earlier entry in configuration order.  With the single-digit route counts
//! this router is configured with, scanning beats any indexing scheme.

use core::fmt;

use vroute_wire::Ipv4Addr;

/// A single routing table entry.
#[derive(Clone, Debug)]
pub struct RouteEntry {
    /// Destination network (e.g. `192.168.1.0` for a /24 route).
    pub dest: Ipv4Addr,
    /// Subnet mask selecting the significant destination bits.
    pub mask: Ipv4Addr,
    /// Next-hop gateway.  `0.0.0.0` means directly attached — the datagram's
    /// destination is itself the next hop.
    pub gateway: Ipv4Addr,
    /// Name of the egress interface.
    pub iface: String,
}

impl RouteEntry {
    /// `true` if `dst` falls within this route's destination network.
    #[inline]
    pub fn matches(&self, dst: Ipv4Addr) -> bool {
        Ipv4Addr::in_subnet(dst, self.dest, self.mask)
    }

    /// Next-hop address for a destination matching this route.
    #[inline]
    pub fn next_hop(&self, dst: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            dst
        } else {
            self.gateway
        }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gateway.is_unspecified() {
            write!(
                f,
                "{}/{} dev {} (connected)",
                self.dest,
                self.mask.mask_len(),
                self.iface
            )
        } else {
            write!(
                f,
                "{}/{} via {} dev {}",
                self.dest,
                self.mask.mask_len(),
                self.gateway,
                self.iface
            )
        }
    }
}

/// Ordered routing table, fixed at startup.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build the table from startup records, preserving configuration order.
    pub fn new(routes: Vec<RouteEntry>) -> Self {
        Self { routes }
    }

    /// Longest-prefix-match lookup.
    ///
    /// Scans every route, keeping the match with the most mask bits; among
    /// equal-length matches the first in configuration order wins.
    pub fn longest_match(&self, dst: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<(&RouteEntry, u32)> = None;
        for route in &self.routes {
            if !route.matches(dst) {
                continue;
            }
            let len = route.mask.mask_len();
            match best {
                Some((_, best_len)) if best_len >= len => {}
                _ => best = Some((route, len)),
            }
        }
        best.map(|(route, _)| route)
    }

    /// All routes in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` if the table holds no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
