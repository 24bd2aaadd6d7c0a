//! Interface registry — the router's local addresses.
//!
//! Built once at startup from configuration records and read-only afterward,
//! so every pipeline thread and the sweeper share it without locking.

use core::fmt;

use vroute_wire::{Ipv4Addr, MacAddr};

/// Longest interface name accepted, in bytes.
pub const IFACE_NAME_MAX: usize = 31;

/// A local virtual interface.
#[derive(Clone, Debug)]
pub struct Interface {
    /// Short name the I/O shim uses to address the port (e.g. `eth0`).
    pub name: String,
    /// Hardware address.
    pub mac: MacAddr,
    /// Assigned IPv4 address.
    pub ip: Ipv4Addr,
    /// Subnet mask.
    pub mask: Ipv4Addr,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {}/{}",
            self.name,
            self.mac,
            self.ip,
            self.mask.mask_len()
        )
    }
}

/// The set of local interfaces, fixed at startup.
#[derive(Clone, Debug, Default)]
pub struct IfaceTable {
    ifaces: Vec<Interface>,
}

impl IfaceTable {
    /// Build the table from startup records, preserving order.
    pub fn new(ifaces: Vec<Interface>) -> Self {
        Self { ifaces }
    }

    /// Look up an interface by name.
    pub fn by_name(&self, name: &str) -> Option<&Interface> {
        self.ifaces.iter().find(|i| i.name == name)
    }

    /// Return the interface owning `ip`, if the address is local.
    ///
    /// Linear scan — the RX path uses this to decide whether a datagram is
    /// addressed to the router itself.
    pub fn by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.ifaces.iter().find(|i| i.ip == ip)
    }

    /// All interfaces in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.ifaces.iter()
    }

    /// Number of interfaces.
    pub fn len(&self) -> usize {
        self.ifaces.len()
    }

    /// `true` if no interface is configured.
    pub fn is_empty(&self) -> bool {
        self.ifaces.is_empty()
    }
}
